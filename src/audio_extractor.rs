use std::path::{Path, PathBuf};
use std::process::Command;

use ffmpeg_next as ffmpeg;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ExtractionError, Result};

/// 语音转写要求的采样率
const SAMPLE_RATE: &str = "16000";

/// 音频提取器：把视频的音轨转成临时的 16kHz 单声道 WAV
///
/// 返回的 `NamedTempFile` 在离开作用域时删除，出错路径上也不会留下文件。
pub struct AudioExtractor {
    input_path: PathBuf,
}

impl AudioExtractor {
    pub fn new(input_path: impl AsRef<Path>) -> Self {
        Self {
            input_path: input_path.as_ref().to_path_buf(),
        }
    }

    /// 视频是否包含音频流
    pub fn has_audio(&self) -> Result<bool> {
        ffmpeg::init().map_err(|e| ExtractionError::Audio(format!("初始化 FFmpeg 失败: {}", e)))?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

        let ictx = ffmpeg::format::input(&self.input_path).map_err(|e| {
            ExtractionError::Audio(format!("无法打开 {}: {}", self.input_path.display(), e))
        })?;
        Ok(ictx.streams().best(ffmpeg::media::Type::Audio).is_some())
    }

    /// 提取音频，视频没有音轨时返回 `None`
    pub fn extract_wav(&self) -> Result<Option<NamedTempFile>> {
        if !self.has_audio()? {
            info!("🔇 [音频提取] 视频不包含音频流");
            return Ok(None);
        }

        let output = tempfile::Builder::new()
            .prefix("ad-scene-audio-")
            .suffix(".wav")
            .tempfile()?;

        // 使用 ffmpeg 命令行工具转码：不含视频，16 位 PCM，16kHz 单声道
        let result = Command::new("ffmpeg")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&self.input_path)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg(SAMPLE_RATE)
            .arg("-ac")
            .arg("1")
            .arg("-y")
            .arg(output.path())
            .output()
            .map_err(|e| ExtractionError::Audio(format!("执行 ffmpeg 命令失败: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ExtractionError::Audio(format!(
                "ffmpeg 退出码 {:?}: {}",
                result.status.code(),
                stderr.trim()
            )));
        }

        let size = output.as_file().metadata()?.len();
        debug!("🎵 [音频提取] 输出 {} ({} 字节)", output.path().display(), size);
        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_is_audio_error() {
        let extractor = AudioExtractor::new("/nonexistent/clip.mp4");
        assert!(matches!(extractor.has_audio(), Err(ExtractionError::Audio(_))));
        assert!(extractor.extract_wav().is_err());
    }
}
