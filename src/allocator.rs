use serde::Serialize;
use tracing::{debug, info};

use crate::scene_segmenter::Scene;

/// 单个场景最多分配的帧数（最后一个场景承接余数，不受此限制）
pub const MAX_FRAMES_PER_SCENE: usize = 6;

/// 场景及其分配到的帧数，两者一一对应
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAllocation {
    pub scenes: Vec<Scene>,
    pub counts: Vec<usize>,
}

impl FrameAllocation {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Scene, usize)> {
        self.scenes.iter().zip(self.counts.iter().copied())
    }
}

/// 按时长比例把帧预算分配到各场景
///
/// 非最后场景取 `max(1, floor(占比 × 预算))` 并封顶；最后场景取余数（至少 1）。
/// 超出预算时反复从当前帧数最多的场景减 1，直到等于预算或所有场景都只剩 1 帧。
pub fn allocate_frames(scenes: &[Scene], budget: usize) -> Vec<usize> {
    if scenes.is_empty() {
        return Vec::new();
    }

    let total_duration: f64 = scenes.iter().map(Scene::duration).sum();
    let mut counts = Vec::with_capacity(scenes.len());
    let mut allocated = 0usize;

    for scene in &scenes[..scenes.len() - 1] {
        let proportion = if total_duration > 0.0 {
            scene.duration() / total_duration
        } else {
            0.0
        };
        let count = ((proportion * budget as f64).floor() as usize)
            .max(1)
            .min(MAX_FRAMES_PER_SCENE);
        counts.push(count);
        allocated += count;
    }
    counts.push(budget.saturating_sub(allocated).max(1));

    let mut total: usize = counts.iter().sum();
    while total > budget {
        let (idx, &max) = counts
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, c)| **c)
            .unwrap_or((0, &1));
        if max <= 1 {
            break;
        }
        counts[idx] -= 1;
        total -= 1;
    }

    counts
}

/// 场景数超过预算时，把最不显著的场景并入相邻场景
///
/// 最不显著 = `boundary_score` 最高，分数相同取较晚的场景。并入前一个场景；
/// 如果是第一个场景则并入后一个。
fn merge_overflow(mut scenes: Vec<Scene>, budget: usize) -> Vec<Scene> {
    while scenes.len() > budget.max(1) {
        let idx = scenes
            .iter()
            .enumerate()
            .fold(0, |best, (i, s)| {
                if s.boundary_score >= scenes[best].boundary_score {
                    i
                } else {
                    best
                }
            });

        let removed = scenes.remove(idx);
        if idx > 0 {
            let prev = &mut scenes[idx - 1];
            prev.end = removed.end;
            debug!(
                "🔗 [帧分配] 场景 {:.2}s 并入前一场景 -> {:.2}s - {:.2}s",
                removed.start, prev.start, prev.end
            );
        } else {
            let next = &mut scenes[0];
            next.start = removed.start;
            next.boundary = removed.boundary;
            next.boundary_score = next.boundary_score.min(removed.boundary_score);
            debug!(
                "🔗 [帧分配] 场景 {:.2}s 并入后一场景 -> {:.2}s - {:.2}s",
                removed.start, next.start, next.end
            );
        }
    }
    scenes
}

/// 完整的分配流程：先处理场景数超出预算的情况，再按比例分配
pub fn plan_allocation(scenes: Vec<Scene>, budget: usize) -> FrameAllocation {
    if budget == 0 || scenes.is_empty() {
        return FrameAllocation {
            scenes: Vec::new(),
            counts: Vec::new(),
        };
    }

    let original = scenes.len();
    let scenes = merge_overflow(scenes, budget);
    if scenes.len() < original {
        info!(
            "🔗 [帧分配] 场景数 {} 超过帧预算 {}，合并为 {} 个场景",
            original,
            budget,
            scenes.len()
        );
    }

    let counts = allocate_frames(&scenes, budget);
    FrameAllocation { scenes, counts }
}
