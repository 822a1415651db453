use std::collections::BTreeMap;
use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::EncodingConfig;
use crate::error::{ExtractionError, Result};

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// 均匀间隔采样（未检测到跳切时的回退路径）
    Interval,
    /// 场景的第一帧，近似镜头切换点
    JumpCut,
    /// 场景内部的补充帧
    SceneInterval,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Interval => "interval",
            FrameType::JumpCut => "jump_cut",
            FrameType::SceneInterval => "scene_interval",
        }
    }

    /// 输出文件名里的标签
    pub fn label(&self) -> &'static str {
        match self {
            FrameType::JumpCut => "JUMPCUT",
            FrameType::Interval | FrameType::SceneInterval => "FILL",
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解码器输出缓冲区的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// 把解码器输出的打包像素缓冲区（每行可能带填充）整理成紧凑的 RGB 图像
///
/// 纯函数，不经过文件系统。`stride` 为每行字节数，必须不小于 `width * 3`。
pub fn canonicalize_rgb(
    data: &[u8],
    stride: usize,
    width: u32,
    height: u32,
    order: ChannelOrder,
) -> Result<RgbImage> {
    if width == 0 || height == 0 {
        return Err(ExtractionError::Encode(format!(
            "图像尺寸无效: {}x{}",
            width, height
        )));
    }
    let row_bytes = width as usize * 3;
    if stride < row_bytes {
        return Err(ExtractionError::Encode(format!(
            "行跨度 {} 小于行宽 {}",
            stride, row_bytes
        )));
    }
    let required = stride * (height as usize - 1) + row_bytes;
    if data.len() < required {
        return Err(ExtractionError::Encode(format!(
            "像素缓冲区过短: 需要 {} 字节, 实际 {} 字节",
            required,
            data.len()
        )));
    }

    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        let row = &row[..row_bytes];
        match order {
            ChannelOrder::Rgb => packed.extend_from_slice(row),
            ChannelOrder::Bgr => {
                for px in row.chunks_exact(3) {
                    packed.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
        }
    }

    RgbImage::from_raw(width, height, packed)
        .ok_or_else(|| ExtractionError::Encode("无法构建 RGB 图像".to_string()))
}

/// 视频中的一个采样帧
#[derive(Debug, Clone)]
pub struct Frame {
    /// 紧凑 RGB 像素
    pub image: RgbImage,
    /// 时间戳（秒）
    pub timestamp: f64,
    pub frame_type: FrameType,
    /// 检测阶段与前一帧的相似度（越低差异越大）
    pub similarity_score: Option<f64>,
    /// 该帧代表的时长（秒）
    pub duration: Option<f64>,
    /// 场景编号，从 1 开始
    pub scene_id: Option<u32>,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp: f64, frame_type: FrameType) -> Self {
        Self {
            image,
            timestamp,
            frame_type,
            similarity_score: None,
            duration: None,
            scene_id: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 编码为 JPEG，最长边超过 `max_size` 时用 Lanczos 等比缩小
    pub fn to_jpeg_bytes(&self, max_size: u32, quality: u8) -> Result<Vec<u8>> {
        let (width, height) = self.image.dimensions();
        let longest = width.max(height);

        let resized;
        let img = if max_size > 0 && longest > max_size {
            let scale = max_size as f64 / longest as f64;
            let new_w = ((width as f64 * scale) as u32).max(1);
            let new_h = ((height as f64 * scale) as u32).max(1);
            resized = image::imageops::resize(&self.image, new_w, new_h, FilterType::Lanczos3);
            &resized
        } else {
            &self.image
        };

        let mut buf = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder
            .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
            .map_err(|e| ExtractionError::Encode(e.to_string()))?;
        Ok(buf.into_inner())
    }

    /// 编码为 `data:image/jpeg;base64,...`，供多模态模型使用
    pub fn encode_data_uri(&self, config: &EncodingConfig) -> Result<String> {
        let jpeg = self.to_jpeg_bytes(config.max_size, config.quality)?;
        Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg)))
    }
}

/// 按场景分组，每组内按时间排序；没有场景编号的帧归入场景 1
pub fn group_frames_by_scene(frames: &[Frame]) -> BTreeMap<u32, Vec<&Frame>> {
    let mut scenes: BTreeMap<u32, Vec<&Frame>> = BTreeMap::new();
    for frame in frames {
        scenes
            .entry(frame.scene_id.unwrap_or(1))
            .or_default()
            .push(frame);
    }
    for group in scenes.values_mut() {
        group.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }
    scenes
}
