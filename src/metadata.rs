use serde::{Deserialize, Serialize};

use crate::config::ExtractionConfig;
use crate::extractor::{ExtractionResult, FrameTypeCounts};
use crate::frame::{Frame, FrameType};
use crate::video_processor::VideoInfo;

/// 单个场景的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    /// 场景编号（从 1 开始）
    pub scene_id: u32,
    /// 场景开始时间（秒）
    pub start_time: f64,
    /// 场景结束时间（秒）
    pub end_time: f64,
    /// 场景持续时间（秒）
    pub duration: f64,
    /// 产生该场景的跳切分数（越低越显著）
    pub boundary_score: f64,
    /// 分配的帧数
    pub allocated_frames: usize,
    /// 实际提取到的帧数（解码失败时可能少于分配数）
    pub extracted_frames: usize,
}

/// 单个输出帧的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub index: usize,
    /// `frames/` 目录下的图片文件名
    pub file: String,
    pub timestamp: f64,
    pub duration: Option<f64>,
    pub frame_type: FrameType,
    pub scene_id: Option<u32>,
}

/// 整个视频的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// 输入视频文件路径
    pub input_video: String,
    /// 处理时间（RFC 3339）
    pub processed_at: String,
    /// 视频总时长（秒）
    pub total_duration: f64,
    /// 视频帧率
    pub fps: f64,
    /// 视频分辨率（宽x高）
    pub resolution: String,
    pub jump_cut_threshold: f64,
    pub max_frames_per_video: usize,
    /// 候选跳切数（含开头）
    pub boundaries_detected: usize,
    pub samples_scanned: usize,
    pub samples_failed: usize,
    /// 是否使用了均匀间隔回退
    pub fallback_used: bool,
    /// 检测到的场景数量
    pub scene_count: usize,
    pub frame_count: usize,
    pub frame_type_counts: FrameTypeCounts,
    /// 场景列表
    pub scenes: Vec<SceneMetadata>,
    pub frames: Vec<FrameMetadata>,
}

/// 帧图片文件名：`frame_{序号}_{时间}s_scene{场景}_{标签}.jpg`
pub fn frame_file_name(index: usize, frame: &Frame) -> String {
    format!(
        "frame_{:03}_{:.2}s_scene{}_{}.jpg",
        index,
        frame.timestamp,
        frame.scene_id.unwrap_or(1),
        frame.frame_type.label()
    )
}

impl VideoMetadata {
    pub fn from_extraction(
        input_video: &str,
        info: &VideoInfo,
        config: &ExtractionConfig,
        result: &ExtractionResult,
    ) -> Self {
        let scenes: Vec<SceneMetadata> = result
            .allocation
            .iter()
            .enumerate()
            .map(|(i, (scene, allocated))| {
                let scene_id = (i + 1) as u32;
                SceneMetadata {
                    scene_id,
                    start_time: scene.start,
                    end_time: scene.end,
                    duration: scene.duration(),
                    boundary_score: scene.boundary_score,
                    allocated_frames: allocated,
                    extracted_frames: result
                        .frames
                        .iter()
                        .filter(|f| f.scene_id == Some(scene_id))
                        .count(),
                }
            })
            .collect();

        let frames: Vec<FrameMetadata> = result
            .frames
            .iter()
            .enumerate()
            .map(|(index, frame)| FrameMetadata {
                index,
                file: frame_file_name(index, frame),
                timestamp: frame.timestamp,
                duration: frame.duration,
                frame_type: frame.frame_type,
                scene_id: frame.scene_id,
            })
            .collect();

        Self {
            input_video: input_video.to_string(),
            processed_at: chrono::Local::now().to_rfc3339(),
            total_duration: result.video_length,
            fps: info.fps,
            resolution: format!("{}x{}", info.width, info.height),
            jump_cut_threshold: config.jump_cut_threshold,
            max_frames_per_video: config.max_frames_per_video,
            boundaries_detected: result.boundaries_detected,
            samples_scanned: result.samples_scanned,
            samples_failed: result.samples_failed,
            fallback_used: result.fallback_used,
            scene_count: scenes.len(),
            frame_count: frames.len(),
            frame_type_counts: result.frame_type_counts(),
            scenes,
            frames,
        }
    }
}
