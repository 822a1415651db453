use std::path::Path;

use ffmpeg_next as ffmpeg;
use image::RgbImage;
use tracing::debug;

use crate::error::{ExtractionError, Result};
use crate::frame::{canonicalize_rgb, ChannelOrder};

/// seek 之后最多读取的数据包数，防止在损坏的流上无限解码
const MAX_PACKETS_PER_SEEK: usize = 600;

/// 时间戳比较的容差（秒）
const TIMESTAMP_EPSILON: f64 = 1e-3;

/// 单帧解码和时长探测原语
///
/// 检测器和场景采样器只通过这个 trait 访问视频，测试里可以用内存实现替换。
pub trait FrameSource {
    /// 视频总时长（秒）
    fn duration(&mut self) -> Result<f64>;

    /// 解码 `timestamp` 处（或紧随其后）的一帧，返回紧凑 RGB 图像
    ///
    /// 失败属于可恢复错误（`ExtractionError::Decode`）。
    fn extract_frame(&mut self, timestamp: f64) -> Result<RgbImage>;
}

/// 视频基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

/// 基于 FFmpeg 的视频处理器，持有一次打开的输入上下文和解码器
pub struct VideoProcessor {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: f64,
    /// 视频流首帧的时间（秒），解码时间减去它得到从 0 开始的时间
    stream_start: f64,
    /// 容器起始时间（AV_TIME_BASE 单位），seek 目标需要加上它
    container_start: i64,
    info: VideoInfo,
}

/// 把 `AV_NOPTS_VALUE` 当作 0
fn known_or_zero(value: i64) -> i64 {
    if value == ffmpeg::ffi::AV_NOPTS_VALUE {
        0
    } else {
        value
    }
}

/// 相对时间（秒）换算成 `seek` 使用的绝对时间戳
fn seek_target(timestamp: f64, container_start: i64) -> i64 {
    container_start + (timestamp.max(0.0) * ffmpeg::ffi::AV_TIME_BASE as f64) as i64
}

/// 流内时间戳换算成从 0 开始的秒数
fn relative_seconds(pts: i64, time_base: f64, stream_start: f64) -> f64 {
    pts as f64 * time_base - stream_start
}

impl VideoProcessor {
    pub fn open(input_path: impl AsRef<Path>) -> Result<Self> {
        let input_path = input_path.as_ref();
        ffmpeg::init().map_err(|e| ExtractionError::Probe(format!("初始化 FFmpeg 失败: {}", e)))?;
        // 只输出错误级别日志，抑制解码警告
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

        let ictx = ffmpeg::format::input(&input_path).map_err(|e| {
            ExtractionError::Probe(format!("无法打开视频文件 {}: {}", input_path.display(), e))
        })?;

        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| ExtractionError::Probe("未找到视频流".to_string()))?;
        let stream_index = stream.index();

        let tb = stream.time_base();
        let time_base = if tb.denominator() > 0 {
            tb.numerator() as f64 / tb.denominator() as f64
        } else {
            0.0
        };

        let stream_start = known_or_zero(stream.start_time()) as f64 * time_base;
        // SAFETY: ictx 在此处有效，只读取一个字段
        let container_start = known_or_zero(unsafe { (*ictx.as_ptr()).start_time });

        let fps = stream.avg_frame_rate();
        let fps = if fps.denominator() > 0 && fps.numerator() > 0 {
            fps.numerator() as f64 / fps.denominator() as f64
        } else {
            30.0
        };

        // 容器时长优先，缺失时退回到流时长
        let duration = if ictx.duration() > 0 {
            ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else if stream.duration() > 0 && time_base > 0.0 {
            stream.duration() as f64 * time_base
        } else {
            0.0
        };

        let decoder_context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| ExtractionError::Probe(format!("无法创建解码器上下文: {}", e)))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|e| ExtractionError::Probe(format!("无法创建视频解码器: {}", e)))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| ExtractionError::Probe(format!("无法创建缩放器: {}", e)))?;

        let info = VideoInfo {
            fps,
            width: decoder.width(),
            height: decoder.height(),
            duration,
        };

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            stream_start,
            container_start,
            info,
        })
    }

    /// 获取视频信息
    pub fn get_video_info(&self) -> VideoInfo {
        self.info
    }

    /// 把解码帧转换成 RGB24 并去掉行填充
    fn convert(
        scaler: &mut ffmpeg::software::scaling::Context,
        decoded: &ffmpeg::frame::Video,
        timestamp: f64,
    ) -> Result<RgbImage> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| ExtractionError::decode(timestamp, format!("像素格式转换失败: {}", e)))?;
        canonicalize_rgb(
            rgb_frame.data(0),
            rgb_frame.stride(0),
            rgb_frame.width(),
            rgb_frame.height(),
            ChannelOrder::Rgb,
        )
        .map_err(|e| ExtractionError::decode(timestamp, e))
    }
}

impl FrameSource for VideoProcessor {
    fn duration(&mut self) -> Result<f64> {
        if self.info.duration > 0.0 {
            Ok(self.info.duration)
        } else {
            Err(ExtractionError::Probe("无法确定视频时长".to_string()))
        }
    }

    fn extract_frame(&mut self, timestamp: f64) -> Result<RgbImage> {
        let Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            stream_start,
            container_start,
            ..
        } = self;

        // Seek 到目标时间之前最近的关键帧
        let target = seek_target(timestamp, *container_start);
        ictx.seek(target, ..target)
            .map_err(|e| ExtractionError::decode(timestamp, format!("seek 失败: {}", e)))?;
        decoder.flush();

        let frame_time = |decoded: &ffmpeg::frame::Video| -> f64 {
            decoded
                .timestamp()
                .or_else(|| decoded.pts())
                .map(|ts| relative_seconds(ts, *time_base, *stream_start))
                .unwrap_or(0.0)
        };

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut last_decoded: Option<ffmpeg::frame::Video> = None;
        let mut packets_read = 0;

        // 向前解码，取第一帧时间不早于目标的帧
        for (stream, packet) in ictx.packets() {
            if stream.index() != *stream_index {
                continue;
            }
            packets_read += 1;
            if packets_read > MAX_PACKETS_PER_SEEK {
                break;
            }
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            while decoder.receive_frame(&mut decoded).is_ok() {
                let t = frame_time(&decoded);
                if t + TIMESTAMP_EPSILON >= timestamp {
                    debug!("🎞️  [解码] 目标 {:.3}s, 实际 {:.3}s", timestamp, t);
                    return Self::convert(scaler, &decoded, timestamp);
                }
                last_decoded = Some(decoded.clone());
            }
        }

        // 流已结束：冲刷解码器，取最后一帧
        if decoder.send_eof().is_ok() {
            while decoder.receive_frame(&mut decoded).is_ok() {
                let t = frame_time(&decoded);
                if t + TIMESTAMP_EPSILON >= timestamp {
                    return Self::convert(scaler, &decoded, timestamp);
                }
                last_decoded = Some(decoded.clone());
            }
        }

        match last_decoded {
            Some(frame) => {
                debug!("🎞️  [解码] {:.3}s 超出流末尾，使用最后一帧", timestamp);
                Self::convert(scaler, &frame, timestamp)
            }
            None => Err(ExtractionError::decode(timestamp, "没有解码出任何帧")),
        }
    }
}
