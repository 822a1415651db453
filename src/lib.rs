pub mod error;
pub mod config;
pub mod frame;
pub mod similarity;
pub mod video_processor;
pub mod detector;
pub mod ranker;
pub mod scene_segmenter;
pub mod allocator;
pub mod sampler;
pub mod extractor;
pub mod audio_extractor;
pub mod transcript;
pub mod analysis;
pub mod metadata;
pub mod processor;

#[cfg(test)]
mod test_support;

pub use error::ExtractionError;
pub use config::{ConfigLoader, ConfigOverrides, ExtractionConfig, ProcessConfig};
pub use frame::{Frame, FrameType};
pub use video_processor::{FrameSource, VideoInfo, VideoProcessor};
pub use detector::{BoundaryCandidate, DetectionReport, JumpCutDetector};
pub use scene_segmenter::Scene;
pub use extractor::{ExtractionResult, FrameExtractor};
pub use audio_extractor::AudioExtractor;
pub use transcript::{AudioExtraction, Transcriber, WhisperClient};
pub use analysis::{AdAnalysis, OpenAiAnalyzer, SceneAnalyzer};
pub use metadata::{FrameMetadata, SceneMetadata, VideoMetadata};
pub use processor::{process_video, ProcessOptions, ProcessOutput};
