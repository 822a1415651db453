use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::audio_extractor::AudioExtractor;
use crate::config::TranscriptionConfig;
use crate::error::{ExtractionError, Result};

/// 没有识别到语音时的占位文本
pub const NO_SPEECH_TEXT: &str = "[No speech detected - background music/sounds only]";

/// Whisper 在音乐或静音上常见的幻觉输出
const HALLUCINATION_PATTERNS: &[&str] = &[
    "thanks for watching",
    "thank you for watching",
    "thanks so much for watching",
    "please subscribe",
    "like and subscribe",
    "bye bye",
    "you",
    "thank you",
    "thanks",
    ".",
];

/// 低于该平均对数概率的片段视为不可信
const MIN_AVG_LOGPROB: f64 = -1.5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// 带时间戳的转写片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// 音频转写结果；失败时 `error` 有值，流水线继续执行
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioExtraction {
    pub duration: f64,
    pub transcript_segments: Vec<TranscriptSegment>,
    pub full_transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AudioExtraction {
    pub fn from_segments(duration: f64, segments: Vec<TranscriptSegment>) -> Self {
        let full_transcript = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            duration,
            transcript_segments: segments,
            full_transcript,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// 语音转写服务
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// 转写音频文件，返回过滤后的片段（至少一条）
    async fn transcribe(&self, audio_path: &Path, audio_duration: f64) -> Result<Vec<TranscriptSegment>>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhisperResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<WhisperSegment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhisperSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub avg_logprob: Option<f64>,
}

fn is_kept_segment(segment: &WhisperSegment) -> bool {
    let text = segment.text.trim();
    let lower = text.to_lowercase();
    if text.chars().count() <= 2 || lower == "[music]" || lower == "[silence]" {
        return false;
    }
    if HALLUCINATION_PATTERNS.iter().any(|p| *p == lower) {
        return false;
    }
    segment.avg_logprob.map_or(true, |p| p > MIN_AVG_LOGPROB)
}

/// 过滤幻觉和低置信度片段；全部被过滤时返回一条"无语音"占位片段
pub fn filter_segments(response: &WhisperResponse, audio_duration: f64) -> Vec<TranscriptSegment> {
    let full_text = response.text.trim().to_lowercase();
    let likely_hallucination = full_text.chars().count() < 50
        && HALLUCINATION_PATTERNS.iter().any(|p| full_text.contains(p));

    let mut segments: Vec<TranscriptSegment> = if likely_hallucination {
        Vec::new()
    } else {
        response
            .segments
            .iter()
            .filter(|s| is_kept_segment(s))
            .map(|s| TranscriptSegment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
                confidence: s.avg_logprob,
            })
            .collect()
    };

    if segments.is_empty() {
        warn!("⚠️  [语音转写] 未检测到语音，可能只有背景音乐或静音");
        segments.push(TranscriptSegment {
            start: 0.0,
            end: audio_duration,
            text: NO_SPEECH_TEXT.to_string(),
            confidence: Some(0.0),
        });
    }
    segments
}

/// OpenAI Whisper 接口客户端
pub struct WhisperClient {
    client: reqwest::Client,
    config: TranscriptionConfig,
    api_key: String,
}

impl WhisperClient {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ExtractionError::Transcription("未配置 OPENAI_API_KEY".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExtractionError::Transcription(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio_path: &Path, audio_duration: f64) -> Result<Vec<TranscriptSegment>> {
        let audio_bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio_bytes)
                    .file_name(file_name)
                    .mime_str("audio/wav")
                    .map_err(|e| ExtractionError::Transcription(format!("构建表单失败: {}", e)))?,
            )
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("temperature", "0");

        let url = format!(
            "{}/audio/transcriptions",
            self.config.api_base.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExtractionError::Transcription(format!("请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Transcription(format!(
                "Whisper API 返回 {}: {}",
                status, body
            )));
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Transcription(format!("解析响应失败: {}", e)))?;
        Ok(filter_segments(&parsed, audio_duration))
    }
}

/// 音频文件时长（秒）
fn probe_audio_duration(path: &Path) -> f64 {
    match ffmpeg::format::input(&path) {
        Ok(ictx) if ictx.duration() > 0 => ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64,
        Ok(_) => 0.0,
        Err(e) => {
            warn!("⚠️  [音频提取] 无法获取音频时长: {}", e);
            0.0
        }
    }
}

/// 提取视频音轨并转写；任何失败都记录在返回值的 `error` 中
pub async fn transcribe_video(video_path: &Path, transcriber: &dyn Transcriber) -> AudioExtraction {
    let start = Instant::now();
    info!("🎵 [音频转写] 开始处理: {}", video_path.display());

    let path: PathBuf = video_path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || {
        AudioExtractor::new(&path).extract_wav().map(|wav| {
            wav.map(|file| {
                let duration = probe_audio_duration(file.path());
                (file, duration)
            })
        })
    })
    .await;

    let (wav, duration) = match extracted {
        Ok(Ok(Some(audio))) => audio,
        Ok(Ok(None)) => {
            return AudioExtraction::from_segments(
                0.0,
                vec![TranscriptSegment {
                    start: 0.0,
                    end: 0.0,
                    text: NO_SPEECH_TEXT.to_string(),
                    confidence: Some(0.0),
                }],
            );
        }
        Ok(Err(e)) => {
            error!("❌ [音频转写] 音频提取失败: {}", e);
            return AudioExtraction::failed(e.to_string());
        }
        Err(e) => {
            error!("❌ [音频转写] 音频提取任务异常: {}", e);
            return AudioExtraction::failed(format!("音频提取任务异常: {}", e));
        }
    };

    // wav 在函数结束时删除
    match transcriber.transcribe(wav.path(), duration).await {
        Ok(segments) => {
            let result = AudioExtraction::from_segments(duration, segments);
            info!(
                "✅ [音频转写] 完成: {} 个片段, 音频时长 {:.2}秒, 耗时: {:.2}秒",
                result.transcript_segments.len(),
                duration,
                start.elapsed().as_secs_f64()
            );
            result
        }
        Err(e) => {
            error!("❌ [音频转写] 转写失败: {}", e);
            AudioExtraction {
                duration,
                ..AudioExtraction::failed(e.to_string())
            }
        }
    }
}
