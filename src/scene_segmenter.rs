use serde::Serialize;
use tracing::debug;

use crate::detector::BoundaryCandidate;

/// 短于此时长（秒）的场景直接丢弃
pub const MIN_SCENE_DURATION: f64 = 0.5;

/// 视频中连续、不重叠的一段时间
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scene {
    pub start: f64,
    pub end: f64,
    /// 产生该场景的跳切时间点
    pub boundary: f64,
    /// 该跳切的排序分数（越低越显著）
    pub boundary_score: f64,
}

impl Scene {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// 把按时间排序的跳切点转换成场景区间
///
/// 每个跳切到下一个跳切为一个场景，最后一个跳切延伸到视频结尾；
/// 时长不超过 `MIN_SCENE_DURATION` 的场景被丢弃，不做合并。
pub fn define_scenes(boundaries: &[BoundaryCandidate], video_length: f64) -> Vec<Scene> {
    let mut scenes = Vec::with_capacity(boundaries.len());

    for (i, boundary) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map(|next| next.timestamp)
            .unwrap_or(video_length);
        let scene = Scene {
            start: boundary.timestamp,
            end,
            boundary: boundary.timestamp,
            boundary_score: boundary.metrics.combined_score,
        };

        if scene.duration() > MIN_SCENE_DURATION {
            scenes.push(scene);
        } else {
            debug!(
                "🎬 [场景划分] 丢弃过短场景 {:.3}s - {:.3}s",
                scene.start, scene.end
            );
        }
    }

    scenes
}
