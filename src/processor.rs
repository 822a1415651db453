use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analysis::{analyze_advertisement, AdAnalysis, OpenAiAnalyzer};
use crate::config::ProcessConfig;
use crate::extractor::{ExtractionResult, FrameExtractor};
use crate::frame::{group_frames_by_scene, Frame, FrameType};
use crate::metadata::{frame_file_name, VideoMetadata};
use crate::transcript::{transcribe_video, AudioExtraction, WhisperClient};
use crate::video_processor::{VideoInfo, VideoProcessor};

/// 保存到磁盘的帧图片最长边
const SAVED_FRAME_MAX_SIZE: u32 = 1024;
/// 保存到磁盘的帧图片 JPEG 质量
const SAVED_FRAME_QUALITY: u8 = 90;
/// summary.md 中转写文本的最大字符数
const SUMMARY_TRANSCRIPT_CHARS: usize = 200;

/// 单次运行的开关
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// 跳过多模态分析
    pub skip_analysis: bool,
}

/// 处理结果
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// 输出目录
    pub output_dir: PathBuf,
    /// 元数据
    pub metadata: VideoMetadata,
    /// 帧图片文件列表（相对 `frames/`）
    pub frame_files: Vec<String>,
    pub audio: AudioExtraction,
    /// 跳过分析时为 None
    pub analysis: Option<AdAnalysis>,
}

/// 处理视频文件：时长检查 → 帧提取与音频转写并行 → 广告分析 → 写出结果
pub async fn process_video(
    input_video_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ProcessConfig,
    options: ProcessOptions,
) -> Result<ProcessOutput> {
    let input_video_path = input_video_path.as_ref();
    let output_dir = output_dir.as_ref();
    let source = input_video_path.to_string_lossy().to_string();

    let total_start = Instant::now();
    info!("🎬 [视频处理] 开始处理视频: {}", input_video_path.display());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    std::fs::create_dir_all(output_dir).context("创建输出目录失败")?;

    let extractor = FrameExtractor::new(config.extraction).context("帧提取配置无效")?;

    // 1. 时长前置检查，超长视频不做任何逐帧解码
    let probe_start = Instant::now();
    let info = probe_video(input_video_path, &extractor)?;
    let probe_duration = probe_start.elapsed();
    info!("✅ [视频处理] 获取视频信息完成，耗时: {:.2}秒", probe_duration.as_secs_f64());
    info!("  • 分辨率: {}x{}", info.width, info.height);
    info!("  • 帧率: {:.2} fps", info.fps);
    info!("  • 时长: {:.2}秒", info.duration);

    // 2. 帧提取和音频转写并行执行
    let parallel_start = Instant::now();
    info!("⏳ [视频处理] 正在并行提取视频帧和音频转写...");

    let frame_path = input_video_path.to_path_buf();
    let frame_task = tokio::task::spawn_blocking(move || -> crate::error::Result<ExtractionResult> {
        let mut processor = VideoProcessor::open(&frame_path)?;
        extractor.extract(&mut processor)
    });

    let audio_task = async {
        match WhisperClient::new(&config.transcription) {
            Ok(client) => transcribe_video(input_video_path, &client).await,
            Err(e) => {
                warn!("⚠️  [视频处理] 跳过音频转写: {}", e);
                AudioExtraction::failed(e.to_string())
            }
        }
    };

    let (frame_joined, audio) = tokio::join!(frame_task, audio_task);
    let result = frame_joined
        .context("帧提取任务异常退出")?
        .map_err(|e| {
            error!("❌ [视频处理] 提取视频帧失败: {}", e);
            e
        })
        .context("提取视频帧失败")?;
    let parallel_duration = parallel_start.elapsed();
    info!("✅ [视频处理] 帧提取与音频转写完成，耗时: {:.2}秒", parallel_duration.as_secs_f64());
    info!("  • 提取帧数: {} 帧", result.frames.len());
    info!("  • 转写片段: {} 个", audio.transcript_segments.len());
    if let Some(audio_error) = &audio.error {
        warn!("⚠️  [视频处理] 音频转写失败: {}", audio_error);
    }

    // 3. 广告分析
    let analysis_start = Instant::now();
    let analysis = if options.skip_analysis {
        info!("⏭️  [视频处理] 按参数跳过广告分析");
        None
    } else {
        match OpenAiAnalyzer::new(&config.analysis) {
            Ok(analyzer) => {
                info!("⏳ [视频处理] 正在进行广告分析 (模型: {})...", config.analysis.model);
                Some(
                    analyze_advertisement(
                        &analyzer,
                        &result.frames,
                        &audio,
                        &source,
                        result.video_length,
                        &config.encoding,
                    )
                    .await,
                )
            }
            Err(e) => {
                warn!("⚠️  [视频处理] 跳过广告分析: {}", e);
                None
            }
        }
    };
    let analysis_duration = analysis_start.elapsed();
    info!("✅ [视频处理] 广告分析阶段完成，耗时: {:.2}秒", analysis_duration.as_secs_f64());

    // 4. 保存帧图片，提取成功后才清理上一次运行留下的帧
    let save_start = Instant::now();
    let frames_dir = output_dir.join("frames");
    if frames_dir.exists() {
        std::fs::remove_dir_all(&frames_dir).context("清理旧的帧目录失败")?;
    }
    std::fs::create_dir_all(&frames_dir).context("创建帧目录失败")?;
    info!("⏳ [视频处理] 正在保存 {} 个帧图片...", result.frames.len());
    let frame_files = save_frames(&result.frames, &frames_dir)?;
    let save_duration = save_start.elapsed();
    info!("✅ [视频处理] 帧图片保存完成，耗时: {:.2}秒", save_duration.as_secs_f64());

    // 5. 写出 JSON 与摘要
    let output_start = Instant::now();
    let metadata = VideoMetadata::from_extraction(&source, &info, &config.extraction, &result);

    write_json(&output_dir.join("transcript.json"), &audio)?;
    if let Some(analysis) = &analysis {
        write_json(&output_dir.join("analysis.json"), analysis)?;
    }
    write_json(&output_dir.join("metadata.json"), &metadata)?;

    let summary = render_summary(
        &metadata,
        &result.frames,
        &audio,
        analysis.as_ref(),
        &config.analysis.model,
    );
    let summary_path = output_dir.join("summary.md");
    std::fs::write(&summary_path, summary)
        .with_context(|| format!("写入摘要失败: {}", summary_path.display()))?;
    let output_duration = output_start.elapsed();
    info!("✅ [视频处理] 结果文件写出完成，耗时: {:.2}秒", output_duration.as_secs_f64());

    // 总结
    let total_duration = total_start.elapsed();
    let total_secs = total_duration.as_secs_f64().max(f64::EPSILON);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "🎉 [视频处理] 处理完成！总耗时: {:.2}秒 ({:.0}ms)",
        total_duration.as_secs_f64(),
        total_duration.as_millis()
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📊 [视频处理] 性能统计:");
    for (stage, elapsed) in [
        ("视频信息", probe_duration),
        ("帧提取+转写", parallel_duration),
        ("广告分析", analysis_duration),
        ("帧图片保存", save_duration),
        ("结果写出", output_duration),
    ] {
        info!(
            "   • {}: {:.2}秒 ({:.1}%)",
            stage,
            elapsed.as_secs_f64(),
            elapsed.as_secs_f64() / total_secs * 100.0
        );
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📁 [视频处理] 输出目录: {}", output_dir.display());
    info!("📸 [视频处理] 帧数量: {} (场景 {})", metadata.frame_count, metadata.scene_count);

    Ok(ProcessOutput {
        output_dir: output_dir.to_path_buf(),
        metadata,
        frame_files,
        audio,
        analysis,
    })
}

/// 打开视频读取基本信息并做时长检查，解码器在返回前释放
fn probe_video(input_video_path: &Path, extractor: &FrameExtractor) -> Result<VideoInfo> {
    let processor = VideoProcessor::open(input_video_path).map_err(|e| {
        error!("❌ [视频处理] 初始化视频处理器失败: {}", e);
        e
    })?;
    let info = processor.get_video_info();
    extractor.check_duration(info.duration).map_err(|e| {
        error!("❌ [视频处理] {}", e);
        e
    })?;
    Ok(info)
}

fn save_frames(frames: &[Frame], frames_dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::with_capacity(frames.len());
    for (i, frame) in frames.iter().enumerate() {
        let filename = frame_file_name(i, frame);
        let jpeg = frame
            .to_jpeg_bytes(SAVED_FRAME_MAX_SIZE, SAVED_FRAME_QUALITY)
            .with_context(|| format!("编码帧失败: {}", filename))?;
        std::fs::write(frames_dir.join(&filename), jpeg)
            .with_context(|| format!("保存帧失败: {}", filename))?;
        debug!("💾 [视频处理] 已保存帧: {}", filename);
        files.push(filename);
    }
    Ok(files)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("序列化失败: {}", path.display()))?;
    std::fs::write(path, json).with_context(|| format!("写入文件失败: {}", path.display()))?;
    debug!("💾 [视频处理] 已写出 {}", path.display());
    Ok(())
}

fn frame_type_description(frame_type: FrameType) -> &'static str {
    match frame_type {
        FrameType::JumpCut => "🎬 跳切",
        FrameType::SceneInterval | FrameType::Interval => "⏱️ 补充",
    }
}

/// 截断到指定字符数，超出时追加省略号
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// 生成 summary.md
pub fn render_summary(
    metadata: &VideoMetadata,
    frames: &[Frame],
    audio: &AudioExtraction,
    analysis: Option<&AdAnalysis>,
    analysis_model: &str,
) -> String {
    let counts = &metadata.frame_type_counts;
    let scenes = group_frames_by_scene(frames);
    let mut out = String::new();

    // 写入 String 不会失败
    let _ = writeln!(out, "# 视频处理摘要\n");
    let _ = writeln!(out, "**视频:** {}", metadata.input_video);
    let _ = writeln!(out, "**处理时间:** {}\n", metadata.processed_at);

    let _ = writeln!(out, "## 视频分析");
    let _ = writeln!(out, "- **时长:** {:.1} 秒", metadata.total_duration);
    let _ = writeln!(out, "- **分辨率:** {}", metadata.resolution);
    let _ = writeln!(out, "- **提取帧数:** {}", metadata.frame_count);
    let _ = writeln!(out, "- **场景数:** {}", scenes.len());
    let _ = writeln!(out, "- **跳切阈值:** {}", metadata.jump_cut_threshold);
    let _ = writeln!(out, "- **候选跳切:** {}", metadata.boundaries_detected);
    if metadata.fallback_used {
        let _ = writeln!(out, "- **采样方式:** 均匀间隔（未检测到跳切）");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## 帧类型统计");
    let _ = writeln!(out, "- **跳切帧:** {}", counts.jump_cut);
    let _ = writeln!(out, "- **补充帧:** {}\n", counts.scene_interval + counts.interval);

    let _ = writeln!(out, "## 场景明细");
    for (scene_id, scene_frames) in &scenes {
        let start = scene_frames.first().map_or(0.0, |f| f.timestamp);
        let end = scene_frames.last().map_or(0.0, |f| f.timestamp);
        let jump_cuts = scene_frames
            .iter()
            .filter(|f| f.frame_type == FrameType::JumpCut)
            .count();
        let _ = writeln!(out, "\n### 场景 {}", scene_id);
        let _ = writeln!(
            out,
            "- **时间范围:** {:.1}s - {:.1}s ({:.1}s)",
            start,
            end,
            end - start
        );
        let _ = writeln!(
            out,
            "- **帧数:** {} ({} 跳切, {} 补充)",
            scene_frames.len(),
            jump_cuts,
            scene_frames.len() - jump_cuts
        );
        let _ = writeln!(out, "- **帧列表:**");
        for frame in scene_frames {
            let _ = writeln!(
                out,
                "  - {:.1}s: {}",
                frame.timestamp,
                frame_type_description(frame.frame_type)
            );
        }
    }

    let _ = writeln!(out, "\n## 音频转写");
    let _ = writeln!(out, "- **转写片段:** {}", audio.transcript_segments.len());
    let _ = writeln!(
        out,
        "- **完整文本:** \"{}\"",
        truncate_chars(&audio.full_transcript, SUMMARY_TRANSCRIPT_CHARS)
    );
    let _ = writeln!(out, "- **错误:** {}\n", audio.error.as_deref().unwrap_or("无"));

    let _ = writeln!(out, "## 广告分析");
    match analysis {
        Some(analysis) => {
            let _ = writeln!(out, "- **模型:** {}", analysis_model);
            let _ = writeln!(out, "- **分析 ID:** {}", analysis.id);
            let _ = writeln!(out, "- **镜头数:** {}", analysis.chunks.len());
            let _ = writeln!(out, "- **概述:** {}\n", analysis.summary);
        }
        None => {
            let _ = writeln!(out, "- 未执行\n");
        }
    }

    let _ = writeln!(out, "## 输出文件");
    let _ = writeln!(out, "- `frames/` - 提取的帧图片");
    let _ = writeln!(out, "- `transcript.json` - 带时间戳的音频转写");
    if analysis.is_some() {
        let _ = writeln!(out, "- `analysis.json` - 结构化广告分析");
    }
    let _ = writeln!(out, "- `metadata.json` - 场景与帧元数据");
    let _ = writeln!(out, "- `summary.md` - 本文件");
    out
}
