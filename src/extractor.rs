use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::allocator::{plan_allocation, FrameAllocation};
use crate::config::ExtractionConfig;
use crate::detector::{BoundaryCandidate, JumpCutDetector};
use crate::error::{ExtractionError, Result};
use crate::frame::{Frame, FrameType};
use crate::ranker::select_most_significant;
use crate::sampler::sample_scene;
use crate::scene_segmenter::define_scenes;
use crate::video_processor::FrameSource;

/// 帧提取的完整结果
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// 按时间排序的最终帧，已标注代表时长
    pub frames: Vec<Frame>,
    pub video_length: f64,
    /// 检测到的候选跳切数（含开头）
    pub boundaries_detected: usize,
    /// 排序筛选后保留的跳切
    pub boundaries: Vec<BoundaryCandidate>,
    pub allocation: FrameAllocation,
    pub samples_scanned: usize,
    pub samples_failed: usize,
    /// 是否走了均匀间隔回退路径
    pub fallback_used: bool,
}

/// 帧类型统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTypeCounts {
    pub interval: usize,
    pub jump_cut: usize,
    pub scene_interval: usize,
}

impl ExtractionResult {
    pub fn frame_type_counts(&self) -> FrameTypeCounts {
        let mut counts = FrameTypeCounts::default();
        for frame in &self.frames {
            match frame.frame_type {
                FrameType::Interval => counts.interval += 1,
                FrameType::JumpCut => counts.jump_cut += 1,
                FrameType::SceneInterval => counts.scene_interval += 1,
            }
        }
        counts
    }
}

/// 帧提取编排器：检测 → 排序 → 场景划分 → 分配 → 场景内采样
#[derive(Debug, Clone, Copy)]
pub struct FrameExtractor {
    config: ExtractionConfig,
}

impl FrameExtractor {
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// 时长前置检查，必须在任何逐帧解码之前执行
    pub fn check_duration(&self, duration: f64) -> Result<()> {
        if duration > self.config.max_video_duration {
            return Err(ExtractionError::VideoTooLong {
                duration,
                max: self.config.max_video_duration,
            });
        }
        Ok(())
    }

    pub fn extract<S: FrameSource + ?Sized>(&self, source: &mut S) -> Result<ExtractionResult> {
        let total_start = Instant::now();
        let max_frames = self.config.max_frames_per_video;

        let video_length = source.duration()?;
        self.check_duration(video_length)?;
        info!("📹 [帧提取] 视频时长: {:.2}秒, 帧预算: {}", video_length, max_frames);

        // 步骤1: 跳切检测
        let step_start = Instant::now();
        let report = JumpCutDetector::new(&self.config).detect(source, video_length)?;
        let boundaries_detected = report.candidates.len();
        info!(
            "✅ [帧提取] 步骤1完成: 检测到 {} 个候选跳切, 耗时: {:.2}秒",
            boundaries_detected,
            step_start.elapsed().as_secs_f64()
        );

        let mut result = ExtractionResult {
            frames: Vec::new(),
            video_length,
            boundaries_detected,
            boundaries: Vec::new(),
            allocation: FrameAllocation {
                scenes: Vec::new(),
                counts: Vec::new(),
            },
            samples_scanned: report.samples_scanned,
            samples_failed: report.samples_failed,
            fallback_used: false,
        };

        if !report.only_opening() {
            // 步骤2: 候选跳切超出预算时按显著性筛选
            result.boundaries = if boundaries_detected > max_frames {
                let kept = select_most_significant(&report.candidates, max_frames);
                info!(
                    "📊 [帧提取] 步骤2: 跳切 {} 个超出预算，保留最显著的 {} 个",
                    boundaries_detected,
                    kept.len()
                );
                kept
            } else {
                report.candidates
            };

            // 步骤3: 场景划分 + 步骤4: 帧分配
            let scenes = define_scenes(&result.boundaries, video_length);
            result.allocation = plan_allocation(scenes, max_frames);
            info!(
                "🎬 [帧提取] 步骤3-4: {} 个场景, 分配 {:?}",
                result.allocation.scenes.len(),
                result.allocation.counts
            );

            // 步骤5: 场景内采样
            let step_start = Instant::now();
            for (i, (scene, count)) in result.allocation.iter().enumerate() {
                let mut frames = sample_scene(source, scene, count, (i + 1) as u32)?;
                if let Some(first) = frames.first_mut().filter(|f| f.frame_type == FrameType::JumpCut) {
                    first.similarity_score = boundary_similarity(&result.boundaries, scene.boundary);
                }
                result.frames.extend(frames);
                if result.frames.len() >= max_frames {
                    result.frames.truncate(max_frames);
                    break;
                }
            }
            info!(
                "✅ [帧提取] 步骤5完成: 采样 {} 帧, 耗时: {:.2}秒",
                result.frames.len(),
                step_start.elapsed().as_secs_f64()
            );
        }

        if result.frames.is_empty() {
            warn!("⚠️  [帧提取] 未找到有效跳切，回退到均匀间隔采样");
            result.frames = extract_interval_frames(source, video_length, max_frames)?;
            result.fallback_used = true;
        }

        if result.frames.is_empty() {
            return Err(ExtractionError::NoFrames(format!(
                "视频时长 {:.2}秒，所有采样点解码失败",
                video_length
            )));
        }

        result
            .frames
            .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        result.frames.truncate(max_frames);
        annotate_durations(&mut result.frames, video_length);

        info!(
            "✅ [帧提取] 完成: {} 帧{}, 总耗时: {:.2}秒",
            result.frames.len(),
            if result.fallback_used { " (均匀间隔)" } else { "" },
            total_start.elapsed().as_secs_f64()
        );
        Ok(result)
    }
}

/// 在整个视频上均匀间隔采样 `count` 帧：第 i 帧位于 (i + 1) × L / (count + 1)
pub fn extract_interval_frames<S: FrameSource + ?Sized>(
    source: &mut S,
    video_length: f64,
    count: usize,
) -> Result<Vec<Frame>> {
    let interval = video_length / (count + 1) as f64;
    let mut frames = Vec::with_capacity(count);

    for i in 0..count {
        let timestamp = (i + 1) as f64 * interval;
        if timestamp >= video_length {
            continue;
        }
        match source.extract_frame(timestamp) {
            Ok(image) => frames.push(Frame::new(image, timestamp, FrameType::Interval)),
            Err(e) if e.is_recoverable() => warn!("⚠️  [均匀采样] 跳过 {:.3}s: {}", timestamp, e),
            Err(e) => return Err(e),
        }
    }

    Ok(frames)
}

/// 场景跳切帧的相似度取自产生该场景的跳切点
fn boundary_similarity(boundaries: &[BoundaryCandidate], at: f64) -> Option<f64> {
    boundaries
        .iter()
        .find(|b| b.timestamp == at)
        .map(|b| b.metrics.combined_similarity)
}

/// 标注每帧代表的时长，帧必须已按时间排序
///
/// 每帧覆盖到下一帧为止，最后一帧覆盖到视频结尾，第一帧同时覆盖视频开头到自身的空档，
/// 因此所有时长之和等于视频时长。
pub fn annotate_durations(frames: &mut [Frame], video_length: f64) {
    let count = frames.len();
    for i in 0..count {
        let end = if i + 1 < count {
            frames[i + 1].timestamp
        } else {
            video_length
        };
        let start = if i == 0 { 0.0 } else { frames[i].timestamp };
        frames[i].duration = Some((end - start).max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedVideo;

    fn extractor(max_frames: usize) -> FrameExtractor {
        FrameExtractor::new(ExtractionConfig {
            jump_cut_threshold: 0.9,
            max_frames_per_video: max_frames,
            max_video_duration: 90.0,
        })
        .unwrap()
    }

    fn total_duration(result: &ExtractionResult) -> f64 {
        result.frames.iter().map(|f| f.duration.unwrap()).sum()
    }

    fn assert_sorted_within_video(result: &ExtractionResult) {
        for w in result.frames.windows(2) {
            assert!(w[0].timestamp <= w[1].timestamp);
        }
        for f in &result.frames {
            assert!(f.timestamp >= 0.0 && f.timestamp < result.video_length);
        }
    }

    #[test]
    fn test_static_video_falls_back_to_intervals() {
        let mut video = ScriptedVideo::new(30.0);
        let result = extractor(30).extract(&mut video).unwrap();

        assert!(result.fallback_used);
        assert_eq!(result.boundaries_detected, 1);
        assert_eq!(result.frames.len(), 30);
        assert!(result.frames.iter().all(|f| f.frame_type == FrameType::Interval));
        assert!((result.frames[0].timestamp - 30.0 / 31.0).abs() < 1e-9);
        assert_sorted_within_video(&result);
        assert!((total_duration(&result) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_evenly_spaced_cuts_under_budget() {
        let mut video = ScriptedVideo::new(30.0).with_cuts([6.0, 12.0, 18.0, 24.0]);
        let result = extractor(30).extract(&mut video).unwrap();

        assert!(!result.fallback_used);
        assert_eq!(result.boundaries.len(), 5);
        assert_eq!(result.allocation.scenes.len(), 5);
        assert!(result.allocation.counts.iter().all(|c| *c >= 1));
        assert_eq!(result.allocation.total(), 30);

        let counts = result.frame_type_counts();
        assert_eq!(counts.jump_cut, 5);
        assert_eq!(counts.scene_interval, 25);
        assert_eq!(counts.interval, 0);

        // 每个场景的第一帧是跳切帧
        for scene_id in 1..=5u32 {
            let first = result
                .frames
                .iter()
                .find(|f| f.scene_id == Some(scene_id))
                .unwrap();
            assert_eq!(first.frame_type, FrameType::JumpCut);
        }
        assert_sorted_within_video(&result);
        assert!((total_duration(&result) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_many_cuts_ranked_down_to_budget() {
        let cuts: Vec<f64> = (1..=50).map(|i| i as f64 * 1.5).collect();
        let mut video = ScriptedVideo::new(80.0).with_cuts(cuts);
        let result = extractor(30).extract(&mut video).unwrap();

        assert_eq!(result.boundaries_detected, 51);
        assert_eq!(result.boundaries.len(), 30);
        assert_eq!(result.boundaries[0], BoundaryCandidate::opening());
        for w in result.boundaries.windows(2) {
            assert!(w[0].timestamp < w[1].timestamp);
        }
        assert!(result.frames.len() <= 30);
        assert_sorted_within_video(&result);
        assert!((total_duration(&result) - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_cap_respected_with_small_budget() {
        for max_frames in 1..=6 {
            let mut video = ScriptedVideo::new(30.0).with_cuts([6.0, 12.0, 18.0, 24.0]);
            let result = extractor(max_frames).extract(&mut video).unwrap();
            assert!(result.frames.len() <= max_frames);
            assert!(!result.frames.is_empty());
            assert_eq!(result.boundaries[0], BoundaryCandidate::opening());
            assert!((total_duration(&result) - 30.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_too_long_rejected_before_decoding() {
        let mut video = ScriptedVideo::new(120.0);
        let err = extractor(30).extract(&mut video).unwrap_err();
        assert!(matches!(err, ExtractionError::VideoTooLong { .. }));
        assert!(video.requests.is_empty());
    }

    #[test]
    fn test_probe_failure_propagates() {
        let mut video = ScriptedVideo::new(0.0);
        assert!(matches!(
            extractor(30).extract(&mut video),
            Err(ExtractionError::Probe(_))
        ));
    }

    #[test]
    fn test_undecodable_video_is_fatal() {
        let mut video = ScriptedVideo::new(10.0).failing_between(0.0, 10.0);
        assert!(matches!(
            extractor(30).extract(&mut video),
            Err(ExtractionError::NoFrames(_))
        ));
    }

    #[test]
    fn test_annotate_durations_covers_leading_gap() {
        let img = crate::test_support::noise_image(0, 4, 4);
        let mut frames = vec![
            Frame::new(img.clone(), 1.0, FrameType::Interval),
            Frame::new(img.clone(), 4.0, FrameType::Interval),
            Frame::new(img, 7.5, FrameType::Interval),
        ];
        annotate_durations(&mut frames, 10.0);
        let durations: Vec<f64> = frames.iter().map(|f| f.duration.unwrap()).collect();
        assert_eq!(durations, vec![4.0, 3.5, 2.5]);
    }

    #[test]
    fn test_jump_cut_frames_carry_boundary_similarity() {
        let mut video = ScriptedVideo::new(30.0).with_cuts([10.0, 20.0]);
        let result = extractor(12).extract(&mut video).unwrap();

        for frame in &result.frames {
            match frame.frame_type {
                FrameType::JumpCut => {
                    let score = frame.similarity_score.unwrap();
                    assert!(score < 0.9);
                }
                _ => assert!(frame.similarity_score.is_none()),
            }
        }
        // 开头的跳切帧相似度为 0
        assert_eq!(result.frames[0].similarity_score, Some(0.0));
    }

    #[test]
    fn test_stream_loss_aborts_extraction() {
        let mut video = ScriptedVideo::new(30.0).with_cuts([10.0]).lost_from(12.0);
        assert!(matches!(
            extractor(12).extract(&mut video),
            Err(ExtractionError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExtractionConfig {
            jump_cut_threshold: 1.2,
            ..ExtractionConfig::default()
        };
        assert!(FrameExtractor::new(config).is_err());
    }
}
