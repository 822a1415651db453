use thiserror::Error;

/// 帧提取流水线的错误类型
///
/// `Decode` 属于可恢复错误：检测器和场景采样器会记录日志后跳过该采样点。
/// 其余变体都会一直传递到调用方。
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("视频时长 ({duration:.1}s) 超过允许的最大时长 ({max:.1}s)")]
    VideoTooLong { duration: f64, max: f64 },

    #[error("无法获取视频信息: {0}")]
    Probe(String),

    #[error("解码 {timestamp:.3}s 处的帧失败: {reason}")]
    Decode { timestamp: f64, reason: String },

    #[error("没有提取到任何帧: {0}")]
    NoFrames(String),

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("图像编码失败: {0}")]
    Encode(String),

    #[error("音频提取失败: {0}")]
    Audio(String),

    #[error("语音转写失败: {0}")]
    Transcription(String),

    #[error("广告分析失败: {0}")]
    Analysis(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    pub fn decode(timestamp: f64, reason: impl ToString) -> Self {
        Self::Decode {
            timestamp,
            reason: reason.to_string(),
        }
    }

    /// 单帧解码失败不会中断流水线
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
