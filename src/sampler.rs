use tracing::{debug, warn};

use crate::error::Result;
use crate::frame::{Frame, FrameType};
use crate::scene_segmenter::Scene;
use crate::video_processor::FrameSource;

/// 场景末尾预留的时间（秒），避免请求恰好落在下一场景的第一帧上
pub const END_MARGIN: f64 = 0.1;

/// 场景内的相对采样位置（0 为场景开头，1 为结尾）
///
/// 1-3 帧偏向两端，更多帧时首尾各一帧、中间均匀分布。
pub fn sample_positions(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.5],
        2 => vec![1.0 / 3.0, 2.0 / 3.0],
        3 => vec![0.0, 0.5, 1.0],
        _ => {
            let mut positions = Vec::with_capacity(n);
            positions.push(0.0);
            positions.extend((1..=n - 2).map(|i| i as f64 / (n - 1) as f64));
            positions.push(1.0);
            positions
        }
    }
}

/// 把相对位置换算成时间戳，并限制在 `[start, end - END_MARGIN]` 内
pub fn scene_timestamps(scene: &Scene, n: usize) -> Vec<f64> {
    let last_allowed = scene.end - END_MARGIN;
    sample_positions(n)
        .into_iter()
        .map(|p| {
            let ts = if p >= 1.0 {
                last_allowed
            } else {
                scene.start + p * scene.duration()
            };
            ts.min(last_allowed).max(scene.start)
        })
        .collect()
}

/// 在场景内提取 `n` 帧；单帧解码失败只会让该位置缺帧，其余错误直接返回
///
/// 第一个位置标记为 `JumpCut`，其余为 `SceneInterval`。
pub fn sample_scene<S: FrameSource + ?Sized>(
    source: &mut S,
    scene: &Scene,
    n: usize,
    scene_id: u32,
) -> Result<Vec<Frame>> {
    let mut frames = Vec::with_capacity(n);

    for (i, timestamp) in scene_timestamps(scene, n).into_iter().enumerate() {
        let frame_type = if i == 0 {
            FrameType::JumpCut
        } else {
            FrameType::SceneInterval
        };

        match source.extract_frame(timestamp) {
            Ok(image) => {
                let mut frame = Frame::new(image, timestamp, frame_type);
                frame.scene_id = Some(scene_id);
                debug!(
                    "📸 [场景采样] 场景 {} 第 {} 帧 @ {:.3}s ({})",
                    scene_id,
                    i + 1,
                    timestamp,
                    frame_type
                );
                frames.push(frame);
            }
            Err(e) if e.is_recoverable() => {
                warn!("⚠️  [场景采样] 场景 {} 跳过 {:.3}s: {}", scene_id, timestamp, e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(frames)
}
