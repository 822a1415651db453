//! 帧相似度计算
//!
//! 所有函数都是纯函数：相同像素输入得到相同结果。返回值 1.0 表示视觉上完全相同，
//! 0.0 表示差异最大。

use image::imageops::FilterType;
use image::RgbImage;
use rustdct::{Dct2, DctPlanner};
use serde::Serialize;

/// 色调直方图分箱数（色调范围 0-180）
const HUE_BINS: usize = 50;
/// 饱和度、亮度直方图分箱数（范围 0-256）
const SAT_VAL_BINS: usize = 60;

const HUE_WEIGHT: f64 = 0.2;
const SAT_WEIGHT: f64 = 0.3;
const VAL_WEIGHT: f64 = 0.5;

const PHASH_SIZE: usize = 32;
const PHASH_BLOCK: usize = 16;
const PHASH_BITS: u32 = (PHASH_BLOCK * PHASH_BLOCK) as u32;

/// 综合相似度中直方图和感知哈希的权重
const COMBINED_HIST_WEIGHT: f64 = 0.25;
const COMBINED_PHASH_WEIGHT: f64 = 0.75;

/// 256 位感知哈希
pub type PerceptualHash = [u64; 4];

/// 两帧之间的全部相似度指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameMetrics {
    /// 生产判定使用的综合相似度
    pub combined: f64,
    pub histogram: f64,
    pub phash: f64,
    /// 仅用于诊断
    pub dhash: f64,
    /// 仅用于诊断
    pub delta: f64,
}

/// 计算两帧的全部指标
pub fn compare_frames(a: &RgbImage, b: &RgbImage) -> FrameMetrics {
    let histogram = histogram_similarity(a, b);
    let phash = phash_similarity(a, b);
    FrameMetrics {
        combined: COMBINED_HIST_WEIGHT * histogram + COMBINED_PHASH_WEIGHT * phash,
        histogram,
        phash,
        dhash: dhash_similarity(a, b),
        delta: delta_intensity(a, b),
    }
}

/// 综合相似度 = 0.25 × 直方图相似度 + 0.75 × 感知哈希相似度
pub fn combined_similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    COMBINED_HIST_WEIGHT * histogram_similarity(a, b) + COMBINED_PHASH_WEIGHT * phash_similarity(a, b)
}

/// RGB 转 HSV，色调单位为度 (0-360)，饱和度和亮度为 0-1
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g.max(b));
    let min = r.min(g.min(b));
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };

    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

struct HsvHistogram {
    hue: [f64; HUE_BINS],
    sat: [f64; SAT_VAL_BINS],
    val: [f64; SAT_VAL_BINS],
}

/// 8 位 HSV 表示：H 0-179，S/V 0-255
fn hsv_histogram(img: &RgbImage) -> HsvHistogram {
    let mut hist = HsvHistogram {
        hue: [0.0; HUE_BINS],
        sat: [0.0; SAT_VAL_BINS],
        val: [0.0; SAT_VAL_BINS],
    };

    for p in img.pixels() {
        let (h, s, v) = rgb_to_hsv(p[0], p[1], p[2]);
        let h8 = ((h / 2.0).round() as usize).min(179);
        let s8 = ((s * 255.0).round() as usize).min(255);
        let v8 = ((v * 255.0).round() as usize).min(255);

        hist.hue[h8 * HUE_BINS / 180] += 1.0;
        hist.sat[s8 * SAT_VAL_BINS / 256] += 1.0;
        hist.val[v8 * SAT_VAL_BINS / 256] += 1.0;
    }
    hist
}

/// 归一化互相关；两组数据都没有方差时视为完全相关
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom < f64::EPSILON {
        1.0
    } else {
        cov / denom
    }
}

/// HSV 直方图相关性，按 {H: 0.2, S: 0.3, V: 0.5} 加权，结果截断到 [0, 1]
pub fn histogram_similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    let ha = hsv_histogram(a);
    let hb = hsv_histogram(b);

    let score = HUE_WEIGHT * correlation(&ha.hue, &hb.hue)
        + SAT_WEIGHT * correlation(&ha.sat, &hb.sat)
        + VAL_WEIGHT * correlation(&ha.val, &hb.val);
    score.clamp(0.0, 1.0)
}

/// 缩放到指定尺寸后的灰度值（0.299R + 0.587G + 0.114B）
fn resized_gray(img: &RgbImage, width: u32, height: u32) -> Vec<f64> {
    let small = image::imageops::resize(img, width, height, FilterType::Triangle);
    small
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .collect()
}

/// 正交归一化的一维 DCT-II，原地计算
fn orthonormal_dct<D: Dct2<f64> + ?Sized>(dct: &D, buf: &mut [f64]) {
    dct.process_dct2(buf);
    let n = buf.len() as f64;
    let dc_scale = (1.0 / n).sqrt();
    let ac_scale = (2.0 / n).sqrt();
    for (k, v) in buf.iter_mut().enumerate() {
        *v *= if k == 0 { dc_scale } else { ac_scale };
    }
}

/// 感知哈希：32×32 灰度图做二维 DCT，取左上 16×16 低频块与中位数比较
pub fn phash(img: &RgbImage) -> PerceptualHash {
    let mut pixels = resized_gray(img, PHASH_SIZE as u32, PHASH_SIZE as u32);

    let mut planner = DctPlanner::<f64>::new();
    let dct = planner.plan_dct2(PHASH_SIZE);

    // 先按行
    for row in pixels.chunks_exact_mut(PHASH_SIZE) {
        orthonormal_dct(dct.as_ref(), row);
    }
    // 再按列
    let mut column = [0.0f64; PHASH_SIZE];
    for x in 0..PHASH_SIZE {
        for y in 0..PHASH_SIZE {
            column[y] = pixels[y * PHASH_SIZE + x];
        }
        orthonormal_dct(dct.as_ref(), &mut column);
        for y in 0..PHASH_SIZE {
            pixels[y * PHASH_SIZE + x] = column[y];
        }
    }

    let mut block = Vec::with_capacity(PHASH_BLOCK * PHASH_BLOCK);
    for y in 0..PHASH_BLOCK {
        block.extend_from_slice(&pixels[y * PHASH_SIZE..y * PHASH_SIZE + PHASH_BLOCK]);
    }

    let mut sorted = block.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

    let mut hash = [0u64; 4];
    for (i, coef) in block.iter().enumerate() {
        if *coef > median {
            hash[i / 64] |= 1u64 << (i % 64);
        }
    }
    hash
}

pub fn phash_hamming(a: &PerceptualHash, b: &PerceptualHash) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// 1 − 汉明距离 / 256
pub fn phash_similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    let distance = phash_hamming(&phash(a), &phash(b));
    1.0 - distance as f64 / PHASH_BITS as f64
}

/// 差值哈希：9×8 灰度图，每个像素与右侧相邻像素比较，得到 64 位指纹
pub fn dhash(img: &RgbImage) -> u64 {
    let gray = resized_gray(img, 9, 8);
    let mut hash = 0u64;
    let mut bit = 0;
    for row in gray.chunks_exact(9) {
        for x in 0..8 {
            if row[x + 1] > row[x] {
                hash |= 1u64 << bit;
            }
            bit += 1;
        }
    }
    hash
}

pub fn dhash_similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    let distance = (dhash(a) ^ dhash(b)).count_ones();
    1.0 - distance as f64 / 64.0
}

fn mean_luminance(img: &RgbImage) -> f64 {
    let count = (img.width() as u64 * img.height() as u64).max(1) as f64;
    let sum: f64 = img
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .sum();
    sum / count
}

/// 平均亮度差映射到 (0, 1]：exp(−Δ/30)
pub fn delta_intensity(a: &RgbImage, b: &RgbImage) -> f64 {
    let delta = (mean_luminance(a) - mean_luminance(b)).abs();
    (-delta / 30.0).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 确定性伪随机图像
    fn noise_image(seed: u64, width: u32, height: u32) -> RgbImage {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
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

    fn solid(r: u8, g: u8, b: u8) -> RgbImage {
        RgbImage::from_pixel(64, 48, image::Rgb([r, g, b]))
    }

    fn checkerboard(cell: u32) -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                image::Rgb([240, 240, 240])
            } else {
                image::Rgb([10, 10, 10])
            }
        })
    }

    #[test]
    fn test_identity() {
        for img in [noise_image(1, 80, 60), checkerboard(8), solid(90, 30, 200)] {
            assert_eq!(phash_similarity(&img, &img), 1.0);
            assert_eq!(delta_intensity(&img, &img), 1.0);
            assert_eq!(dhash_similarity(&img, &img), 1.0);
            assert!((histogram_similarity(&img, &img) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_score_bounds() {
        let images = [
            noise_image(7, 64, 64),
            noise_image(8, 32, 48),
            checkerboard(4),
            checkerboard(16),
            solid(0, 0, 0),
            solid(255, 255, 255),
            solid(255, 0, 0),
        ];
        for a in &images {
            for b in &images {
                let m = compare_frames(a, b);
                assert!((0.0..=1.0).contains(&m.histogram), "histogram {}", m.histogram);
                assert!((0.0..=1.0).contains(&m.phash), "phash {}", m.phash);
                assert!((0.0..=1.0).contains(&m.dhash));
                assert!(m.delta > 0.0 && m.delta <= 1.0);
                assert!((-0.05..=1.05).contains(&m.combined));
            }
        }
    }

    #[test]
    fn test_different_content_scores_lower() {
        let a = checkerboard(8);
        let b = noise_image(3, 64, 64);
        let same = combined_similarity(&a, &a);
        let different = combined_similarity(&a, &b);
        assert!(different < same);
        assert!(different < 0.9);
    }

    #[test]
    fn test_delta_intensity_decay() {
        let dark = solid(0, 0, 0);
        let bright = solid(255, 255, 255);
        let score = delta_intensity(&dark, &bright);
        assert!((score - (-255.0f64 / 30.0).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_phash_is_deterministic() {
        let img = noise_image(42, 100, 100);
        assert_eq!(phash(&img), phash(&img));
        assert_eq!(phash_hamming(&phash(&img), &phash(&img)), 0);
    }

    #[test]
    fn test_hsv_conversion() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0.0, 1.0, 1.0));
        let (h, s, v) = rgb_to_hsv(0, 0, 255);
        assert!((h - 240.0).abs() < 1e-9);
        assert_eq!((s, v), (1.0, 1.0));
        assert_eq!(rgb_to_hsv(0, 0, 0), (0.0, 0.0, 0.0));
    }
}
