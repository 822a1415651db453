//! 流水线测试用的内存视频源

use image::RgbImage;

use crate::error::{ExtractionError, Result};
use crate::video_processor::FrameSource;

/// 确定性伪随机图像，不同种子之间的感知哈希差异很大
pub(crate) fn noise_image(seed: u64, width: u32, height: u32) -> RgbImage {
    let mut state = seed
        .wrapping_add(1)
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 56) as u8
        };
        image::Rgb([next(), next(), next()])
    })
}

/// 按镜头脚本生成画面的视频：同一镜头内的帧完全相同，镜头之间画面无关
pub(crate) struct ScriptedVideo {
    length: f64,
    cuts: Vec<f64>,
    failing: Vec<(f64, f64)>,
    lost_from: Option<f64>,
    pub requests: Vec<f64>,
}

impl ScriptedVideo {
    pub fn new(length: f64) -> Self {
        Self {
            length,
            cuts: Vec::new(),
            failing: Vec::new(),
            lost_from: None,
            requests: Vec::new(),
        }
    }

    /// 镜头切换时间点（不含 0）
    pub fn with_cuts(mut self, cuts: impl IntoIterator<Item = f64>) -> Self {
        self.cuts = cuts.into_iter().collect();
        self
    }

    /// `[from, to]` 内的解码请求全部失败
    pub fn failing_between(mut self, from: f64, to: f64) -> Self {
        self.failing.push((from, to));
        self
    }

    /// 从 `from` 起读取失败且不可恢复（模拟文件被截断）
    pub fn lost_from(mut self, from: f64) -> Self {
        self.lost_from = Some(from);
        self
    }

    pub fn shot_at(&self, timestamp: f64) -> usize {
        self.cuts.iter().filter(|c| **c <= timestamp + 1e-9).count()
    }
}

impl FrameSource for ScriptedVideo {
    fn duration(&mut self) -> Result<f64> {
        if self.length > 0.0 {
            Ok(self.length)
        } else {
            Err(ExtractionError::Probe("无法确定视频时长".to_string()))
        }
    }

    fn extract_frame(&mut self, timestamp: f64) -> Result<RgbImage> {
        self.requests.push(timestamp);
        if self.lost_from.is_some_and(|from| timestamp >= from - 1e-9) {
            return Err(ExtractionError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "scripted stream loss",
            )));
        }
        if self
            .failing
            .iter()
            .any(|(from, to)| timestamp >= *from - 1e-9 && timestamp <= *to + 1e-9)
        {
            return Err(ExtractionError::decode(timestamp, "scripted failure"));
        }
        Ok(noise_image(self.shot_at(timestamp) as u64, 32, 24))
    }
}
