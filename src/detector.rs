use std::time::Instant;

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::similarity::{compare_frames, FrameMetrics};
use crate::video_processor::FrameSource;

/// 检测阶段的固定采样率（帧/秒）
pub const DETECTION_FPS: f64 = 6.0;

/// 跳切候选点携带的指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundaryMetrics {
    /// 与前一帧的综合相似度
    pub combined_similarity: f64,
    pub histogram: f64,
    pub delta: f64,
    /// 排序用分数 = (直方图相似度 + 亮度差相似度) / 2，越低越显著
    pub combined_score: f64,
}

impl BoundaryMetrics {
    pub fn from_frame_metrics(metrics: &FrameMetrics) -> Self {
        Self {
            combined_similarity: metrics.combined,
            histogram: metrics.histogram,
            delta: metrics.delta,
            combined_score: (metrics.histogram + metrics.delta) / 2.0,
        }
    }
}

/// 可能的镜头切换点
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundaryCandidate {
    pub timestamp: f64,
    pub metrics: BoundaryMetrics,
}

impl BoundaryCandidate {
    /// 视频开头：无条件作为最显著的候选点，保证首帧总被保留
    pub fn opening() -> Self {
        Self {
            timestamp: 0.0,
            metrics: BoundaryMetrics {
                combined_similarity: 0.0,
                histogram: 0.0,
                delta: 0.0,
                combined_score: 0.0,
            },
        }
    }
}

/// 单个采样点的诊断指标
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SampleMetrics {
    pub timestamp: f64,
    #[serde(flatten)]
    pub metrics: FrameMetrics,
    pub is_boundary: bool,
}

/// 一次检测扫描的结果
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    /// 按时间排序的候选点，第一个总是 t=0
    pub candidates: Vec<BoundaryCandidate>,
    pub samples: Vec<SampleMetrics>,
    pub samples_scanned: usize,
    pub samples_failed: usize,
}

impl DetectionReport {
    /// 除开头外没有任何真实的跳切
    pub fn only_opening(&self) -> bool {
        self.candidates.len() <= 1
    }
}

/// 跳切检测器
///
/// 只保存阈值，不持有任何视频相关的状态，可以对多个视频重复使用。
#[derive(Debug, Clone, Copy)]
pub struct JumpCutDetector {
    threshold: f64,
}

impl JumpCutDetector {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            threshold: config.jump_cut_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 以固定采样率线性扫描整个视频
    ///
    /// 单帧解码失败只跳过该采样点，其余错误直接返回。
    pub fn detect<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        video_length: f64,
    ) -> Result<DetectionReport> {
        let start = Instant::now();
        let interval = 1.0 / DETECTION_FPS;

        let mut report = DetectionReport {
            candidates: vec![BoundaryCandidate::opening()],
            samples: Vec::new(),
            samples_scanned: 1,
            samples_failed: 0,
        };

        let mut previous: RgbImage = match source.extract_frame(0.0) {
            Ok(img) => img,
            Err(e) if e.is_recoverable() => {
                warn!("⚠️  [跳切检测] 首帧解码失败，只保留开头: {}", e);
                report.samples_failed = 1;
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        info!(
            "🔍 [跳切检测] 开始扫描: 时长 {:.2}秒, 采样间隔 {:.3}秒, 阈值 {:.2}",
            video_length, interval, self.threshold
        );

        // 用 i * interval 计算时间，避免浮点累加误差
        let mut i: u64 = 1;
        loop {
            let timestamp = i as f64 * interval;
            if timestamp >= video_length {
                break;
            }
            i += 1;
            report.samples_scanned += 1;

            let current = match source.extract_frame(timestamp) {
                Ok(img) => img,
                Err(e) if e.is_recoverable() => {
                    // 保留上一帧作为比较基准
                    warn!("⚠️  [跳切检测] 跳过 {:.3}s: {}", timestamp, e);
                    report.samples_failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let metrics = compare_frames(&previous, &current);
            let is_boundary = metrics.combined < self.threshold;
            if is_boundary {
                debug!(
                    "✂️  [跳切检测] {:.3}s 相似度 {:.3} (直方图 {:.3}, pHash {:.3})",
                    timestamp, metrics.combined, metrics.histogram, metrics.phash
                );
                report.candidates.push(BoundaryCandidate {
                    timestamp,
                    metrics: BoundaryMetrics::from_frame_metrics(&metrics),
                });
            }
            report.samples.push(SampleMetrics {
                timestamp,
                metrics,
                is_boundary,
            });

            previous = current;
        }

        info!(
            "✅ [跳切检测] 完成: 采样 {} 个, 失败 {} 个, 候选跳切 {} 个, 耗时: {:.2}秒",
            report.samples_scanned,
            report.samples_failed,
            report.candidates.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(report)
    }
}
