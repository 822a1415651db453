use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ExtractionError, Result};

/// 镜头切换判定阈值：综合相似度低于该值即视为跳切
pub const DEFAULT_JUMP_CUT_THRESHOLD: f64 = 0.65;
/// 每个视频最多保留的帧数
pub const DEFAULT_MAX_FRAMES_PER_VIDEO: usize = 30;
/// 允许处理的最大视频时长（秒）
pub const DEFAULT_MAX_VIDEO_DURATION: f64 = 90.0;
/// 发送给模型的帧图片最长边（像素）
pub const DEFAULT_FRAME_IMAGE_MAX_SIZE: u32 = 512;
/// 帧图片 JPEG 质量
pub const DEFAULT_FRAME_IMAGE_QUALITY: u8 = 70;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const CONFIG_FILE_NAME: &str = "ad-scene-parse.ini";
const HIDDEN_CONFIG_FILE_NAME: &str = ".ad-scene-parse.ini";

/// 帧提取配置，启动时校验一次，之后按值传入流水线的每个阶段
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionConfig {
    /// 跳切检测阈值，取值范围 (0, 1)
    pub jump_cut_threshold: f64,
    /// 每个视频最多输出的帧数
    pub max_frames_per_video: usize,
    /// 允许的最大视频时长（秒）
    pub max_video_duration: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            jump_cut_threshold: DEFAULT_JUMP_CUT_THRESHOLD,
            max_frames_per_video: DEFAULT_MAX_FRAMES_PER_VIDEO,
            max_video_duration: DEFAULT_MAX_VIDEO_DURATION,
        }
    }
}

impl ExtractionConfig {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        if !(self.jump_cut_threshold > 0.0 && self.jump_cut_threshold < 1.0) {
            errors.push(format!(
                "jump_cut_threshold 必须在 (0, 1) 之间，当前为 {}",
                self.jump_cut_threshold
            ));
        }
        if self.max_frames_per_video == 0 {
            errors.push("max_frames_per_video 必须为正整数".to_string());
        }
        if !(self.max_video_duration > 0.0) || !self.max_video_duration.is_finite() {
            errors.push(format!(
                "max_video_duration 必须为正数，当前为 {}",
                self.max_video_duration
            ));
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.collect_errors(&mut errors);
        into_result(errors)
    }
}

/// 帧图片编码配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingConfig {
    /// 最长边上限（像素），超过则等比缩小
    pub max_size: u32,
    /// JPEG 质量 (1-100)
    pub quality: u8,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_FRAME_IMAGE_MAX_SIZE,
            quality: DEFAULT_FRAME_IMAGE_QUALITY,
        }
    }
}

impl EncodingConfig {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.max_size == 0 {
            errors.push("frame_image_max_size 必须为正整数".to_string());
        }
        if !(1..=100).contains(&self.quality) {
            errors.push(format!(
                "frame_image_quality 必须在 1-100 之间，当前为 {}",
                self.quality
            ));
        }
    }
}

/// 语音转写服务配置
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub model: String,
    pub language: String,
    pub api_base: String,
    /// 只从环境变量 OPENAI_API_KEY 读取
    pub api_key: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: "en".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
        }
    }
}

/// 广告分析（多模态模型）配置
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub api_base: String,
    pub api_key: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 4096,
            timeout_secs: 1200,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
        }
    }
}

/// 完整的处理配置
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub extraction: ExtractionConfig,
    pub encoding: EncodingConfig,
    pub transcription: TranscriptionConfig,
    pub analysis: AnalysisConfig,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            encoding: EncodingConfig::default(),
            transcription: TranscriptionConfig::default(),
            analysis: AnalysisConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ProcessConfig {
    /// 校验全部配置项，一次性报告所有错误
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.extraction.collect_errors(&mut errors);
        self.encoding.collect_errors(&mut errors);
        if self.analysis.max_tokens == 0 {
            errors.push("analysis.max_tokens 必须为正整数".to_string());
        }
        if self.analysis.timeout_secs == 0 {
            errors.push("analysis.timeout_secs 必须为正整数".to_string());
        }
        if !matches!(
            self.log_level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            errors.push(format!("未知的日志级别: {}", self.log_level));
        }
        into_result(errors)
    }
}

fn into_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ExtractionError::InvalidConfig(errors.join("; ")))
    }
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub jump_cut_threshold: Option<f64>,
    pub max_frames_per_video: Option<usize>,
    pub max_video_duration: Option<f64>,
}

/// 单个配置来源读到的值，未设置的项为 None
#[derive(Debug, Clone, Default)]
struct PartialConfig {
    jump_cut_threshold: Option<f64>,
    max_frames_per_video: Option<usize>,
    max_video_duration: Option<f64>,
    frame_image_max_size: Option<u32>,
    frame_image_quality: Option<u8>,
    transcription_model: Option<String>,
    transcription_language: Option<String>,
    analysis_model: Option<String>,
    analysis_max_tokens: Option<u32>,
    analysis_timeout_secs: Option<u64>,
    api_base: Option<String>,
    /// 只来自环境变量
    api_key: Option<String>,
    log_level: Option<String>,
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load_config(
        config_file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<ProcessConfig> {
        Self::load_with_env(config_file, overrides, &Self::load_from_env())
    }

    fn load_with_env(
        config_file: Option<&Path>,
        overrides: &ConfigOverrides,
        env: &PartialConfig,
    ) -> Result<ProcessConfig> {
        // 显式指定的配置文件必须能读到；默认位置找不到则忽略
        let file = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };

        let config = Self::merge(overrides, env, &file);
        config.validate()?;
        Ok(config)
    }

    fn merge(overrides: &ConfigOverrides, env: &PartialConfig, file: &PartialConfig) -> ProcessConfig {
        let defaults = ProcessConfig::default();
        let api_base = env
            .api_base
            .clone()
            .or_else(|| file.api_base.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = env.api_key.clone();

        ProcessConfig {
            extraction: ExtractionConfig {
                jump_cut_threshold: overrides
                    .jump_cut_threshold
                    .or(env.jump_cut_threshold)
                    .or(file.jump_cut_threshold)
                    .unwrap_or(defaults.extraction.jump_cut_threshold),
                max_frames_per_video: overrides
                    .max_frames_per_video
                    .or(env.max_frames_per_video)
                    .or(file.max_frames_per_video)
                    .unwrap_or(defaults.extraction.max_frames_per_video),
                max_video_duration: overrides
                    .max_video_duration
                    .or(env.max_video_duration)
                    .or(file.max_video_duration)
                    .unwrap_or(defaults.extraction.max_video_duration),
            },
            encoding: EncodingConfig {
                max_size: env
                    .frame_image_max_size
                    .or(file.frame_image_max_size)
                    .unwrap_or(defaults.encoding.max_size),
                quality: env
                    .frame_image_quality
                    .or(file.frame_image_quality)
                    .unwrap_or(defaults.encoding.quality),
            },
            transcription: TranscriptionConfig {
                model: env
                    .transcription_model
                    .clone()
                    .or_else(|| file.transcription_model.clone())
                    .unwrap_or(defaults.transcription.model),
                language: env
                    .transcription_language
                    .clone()
                    .or_else(|| file.transcription_language.clone())
                    .unwrap_or(defaults.transcription.language),
                api_base: api_base.clone(),
                api_key: api_key.clone(),
            },
            analysis: AnalysisConfig {
                model: env
                    .analysis_model
                    .clone()
                    .or_else(|| file.analysis_model.clone())
                    .unwrap_or(defaults.analysis.model),
                max_tokens: env
                    .analysis_max_tokens
                    .or(file.analysis_max_tokens)
                    .unwrap_or(defaults.analysis.max_tokens),
                timeout_secs: env
                    .analysis_timeout_secs
                    .or(file.analysis_timeout_secs)
                    .unwrap_or(defaults.analysis.timeout_secs),
                api_base,
                api_key,
            },
            log_level: env
                .log_level
                .clone()
                .or_else(|| file.log_level.clone())
                .unwrap_or(defaults.log_level),
        }
    }

    /// 从环境变量加载配置
    fn load_from_env() -> PartialConfig {
        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            env::var(key).ok().and_then(|v| v.trim().parse().ok())
        }
        fn text(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.is_empty())
        }

        PartialConfig {
            jump_cut_threshold: parsed("AD_SCENE_JUMP_CUT_THRESHOLD"),
            max_frames_per_video: parsed("AD_SCENE_MAX_FRAMES"),
            max_video_duration: parsed("AD_SCENE_MAX_VIDEO_DURATION"),
            frame_image_max_size: parsed("AD_SCENE_FRAME_MAX_SIZE"),
            frame_image_quality: parsed("AD_SCENE_FRAME_QUALITY"),
            transcription_model: text("AD_SCENE_TRANSCRIPTION_MODEL"),
            transcription_language: text("AD_SCENE_TRANSCRIPTION_LANGUAGE"),
            analysis_model: text("AD_SCENE_ANALYSIS_MODEL"),
            analysis_max_tokens: parsed("AD_SCENE_ANALYSIS_MAX_TOKENS"),
            analysis_timeout_secs: parsed("AD_SCENE_ANALYSIS_TIMEOUT"),
            api_base: text("AD_SCENE_API_BASE"),
            api_key: text("OPENAI_API_KEY"),
            log_level: text("LOG_LEVEL"),
        }
    }

    /// 从INI配置文件加载配置
    fn load_from_file(config_path: &Path) -> Result<PartialConfig> {
        if !config_path.exists() {
            return Err(ExtractionError::InvalidConfig(format!(
                "配置文件不存在: {}",
                config_path.display()
            )));
        }

        let mut ini = configparser::ini::Ini::new();
        ini.load(config_path).map_err(|e| {
            ExtractionError::InvalidConfig(format!(
                "读取配置文件失败: {}: {}",
                config_path.display(),
                e
            ))
        })?;

        // 先读指定节，没有则回退到 [DEFAULT] 节
        let get = |section: &str, key: &str| -> Option<String> {
            ini.get(section, key)
                .or_else(|| ini.get("DEFAULT", key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parse = |section: &str, key: &str| -> Result<Option<f64>> {
            get(section, key)
                .map(|v| {
                    v.parse::<f64>().map_err(|_| {
                        ExtractionError::InvalidConfig(format!("[{}] {} 不是合法数字: {}", section, key, v))
                    })
                })
                .transpose()
        };
        let parse_int = |section: &str, key: &str| -> Result<Option<u64>> {
            get(section, key)
                .map(|v| {
                    v.parse::<u64>().map_err(|_| {
                        ExtractionError::InvalidConfig(format!("[{}] {} 不是合法整数: {}", section, key, v))
                    })
                })
                .transpose()
        };

        Ok(PartialConfig {
            jump_cut_threshold: parse("extraction", "jump_cut_threshold")?,
            max_frames_per_video: parse_int("extraction", "max_frames_per_video")?.map(|v| v as usize),
            max_video_duration: parse("extraction", "max_video_duration")?,
            frame_image_max_size: parse_int("encoding", "frame_image_max_size")?
                .map(|v| v.min(u32::MAX as u64) as u32),
            frame_image_quality: parse_int("encoding", "frame_image_quality")?
                .map(|v| v.min(u8::MAX as u64) as u8),
            transcription_model: get("transcription", "model"),
            transcription_language: get("transcription", "language"),
            analysis_model: get("analysis", "model"),
            analysis_max_tokens: parse_int("analysis", "max_tokens")?
                .map(|v| v.min(u32::MAX as u64) as u32),
            analysis_timeout_secs: parse_int("analysis", "timeout_secs")?,
            api_base: get("analysis", "api_base"),
            api_key: None,
            log_level: get("logging", "level"),
        })
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Option<PartialConfig> {
        let mut candidates = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from(HIDDEN_CONFIG_FILE_NAME),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(HIDDEN_CONFIG_FILE_NAME));
        }
        candidates.push(PathBuf::from("/etc").join(CONFIG_FILE_NAME));

        candidates
            .iter()
            .find(|path| path.exists())
            .and_then(|path| match Self::load_from_file(path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!("⚠️  [配置] 忽略无法解析的配置文件 {}: {}", path.display(), e);
                    None
                }
            })
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let defaults = ProcessConfig::default();
        let mut ini = configparser::ini::Ini::new();
        ini.set(
            "extraction",
            "jump_cut_threshold",
            Some(defaults.extraction.jump_cut_threshold.to_string()),
        );
        ini.set(
            "extraction",
            "max_frames_per_video",
            Some(defaults.extraction.max_frames_per_video.to_string()),
        );
        ini.set(
            "extraction",
            "max_video_duration",
            Some(defaults.extraction.max_video_duration.to_string()),
        );
        ini.set(
            "encoding",
            "frame_image_max_size",
            Some(defaults.encoding.max_size.to_string()),
        );
        ini.set(
            "encoding",
            "frame_image_quality",
            Some(defaults.encoding.quality.to_string()),
        );
        ini.set("transcription", "model", Some(defaults.transcription.model));
        ini.set("transcription", "language", Some(defaults.transcription.language));
        ini.set("analysis", "model", Some(defaults.analysis.model));
        ini.set(
            "analysis",
            "max_tokens",
            Some(defaults.analysis.max_tokens.to_string()),
        );
        ini.set(
            "analysis",
            "timeout_secs",
            Some(defaults.analysis.timeout_secs.to_string()),
        );
        ini.set("analysis", "api_base", Some(defaults.analysis.api_base));
        ini.set("logging", "level", Some(defaults.log_level));

        ini.write(config_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 测试不读取真实环境变量
    fn no_env() -> PartialConfig {
        PartialConfig::default()
    }

    fn write_ini(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(ProcessConfig::default().validate().is_ok());
        assert!(ExtractionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        for threshold in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let config = ExtractionConfig {
                jump_cut_threshold: threshold,
                ..ExtractionConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ExtractionError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut config = ProcessConfig::default();
        config.extraction.max_frames_per_video = 0;
        config.extraction.max_video_duration = -1.0;
        config.encoding.quality = 0;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("max_frames_per_video"));
        assert!(message.contains("max_video_duration"));
        assert!(message.contains("frame_image_quality"));
    }

    #[test]
    fn test_load_from_file_and_cli_override() {
        let file = write_ini(
            "[extraction]\njump_cut_threshold = 0.72\nmax_frames_per_video = 20\n\n[encoding]\nframe_image_quality = 80\n",
        );
        let overrides = ConfigOverrides {
            max_frames_per_video: Some(12),
            ..ConfigOverrides::default()
        };

        let config = ConfigLoader::load_with_env(Some(file.path()), &overrides, &no_env()).unwrap();
        assert!((config.extraction.jump_cut_threshold - 0.72).abs() < 1e-9);
        assert_eq!(config.extraction.max_frames_per_video, 12);
        assert_eq!(config.encoding.quality, 80);
        assert_eq!(config.encoding.max_size, DEFAULT_FRAME_IMAGE_MAX_SIZE);
    }

    #[test]
    fn test_env_between_cli_and_file() {
        let file = write_ini(
            "[extraction]\njump_cut_threshold = 0.72\nmax_frames_per_video = 20\nmax_video_duration = 60\n",
        );
        let env = PartialConfig {
            jump_cut_threshold: Some(0.5),
            max_frames_per_video: Some(25),
            api_key: Some("sk-test".to_string()),
            ..PartialConfig::default()
        };
        let overrides = ConfigOverrides {
            max_frames_per_video: Some(12),
            ..ConfigOverrides::default()
        };

        let config = ConfigLoader::load_with_env(Some(file.path()), &overrides, &env).unwrap();
        assert!((config.extraction.jump_cut_threshold - 0.5).abs() < 1e-9);
        assert_eq!(config.extraction.max_frames_per_video, 12);
        assert!((config.extraction.max_video_duration - 60.0).abs() < 1e-9);
        assert_eq!(config.analysis.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.transcription.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_api_key_never_read_from_file() {
        let file = write_ini("[analysis]\napi_key = sk-from-file\n");
        let config =
            ConfigLoader::load_with_env(Some(file.path()), &ConfigOverrides::default(), &no_env()).unwrap();
        assert!(config.analysis.api_key.is_none());
    }

    #[test]
    fn test_default_section_fallback() {
        let file = write_ini("[DEFAULT]\nmax_video_duration = 45\n");
        let config = ConfigLoader::load_with_env(Some(file.path()), &ConfigOverrides::default(), &no_env()).unwrap();
        assert!((config.extraction.max_video_duration - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_value_in_file() {
        let file = write_ini("[extraction]\njump_cut_threshold = high\n");
        let result = ConfigLoader::load_with_env(Some(file.path()), &ConfigOverrides::default(), &no_env());
        assert!(matches!(result, Err(ExtractionError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = ConfigLoader::load_with_env(
            Some(Path::new("/nonexistent/ad-scene-parse.ini")),
            &ConfigOverrides::default(),
            &no_env(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_create_default_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ad-scene-parse.ini");
        ConfigLoader::create_default_config(&path).unwrap();

        let config = ConfigLoader::load_with_env(Some(&path), &ConfigOverrides::default(), &no_env()).unwrap();
        assert_eq!(config.extraction, ExtractionConfig::default());
        assert_eq!(config.encoding, EncodingConfig::default());
    }
}
