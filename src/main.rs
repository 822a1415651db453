use ad_scene_parse::config::{ConfigLoader, ConfigOverrides};
use ad_scene_parse::{
    process_video, FrameExtractor, FrameSource, JumpCutDetector, ProcessOptions, VideoProcessor,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 广告视频拉片工具 - 按跳切提取关键帧、转写音频并生成结构化分析
#[derive(Parser, Debug)]
#[command(name = "ad-scene-parse")]
#[command(about = "广告视频拉片工具：跳切检测、场景帧提取、音频转写、广告分析", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 处理本地视频文件，输出帧图片、转写、分析和摘要
    Process {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 输出目录
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// 配置文件路径（可选，.ini 格式）
        /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
        #[arg(long)]
        config: Option<PathBuf>,

        /// 跳切检测阈值 (0.0-1.0)，相似度低于该值视为跳切
        /// 可通过环境变量 AD_SCENE_JUMP_CUT_THRESHOLD 或配置文件设置
        #[arg(long)]
        threshold: Option<f64>,

        /// 每个视频最多提取的帧数
        /// 可通过环境变量 AD_SCENE_MAX_FRAMES 或配置文件设置
        #[arg(long)]
        max_frames: Option<usize>,

        /// 允许处理的最长视频（秒）
        /// 可通过环境变量 AD_SCENE_MAX_VIDEO_DURATION 或配置文件设置
        #[arg(long)]
        max_duration: Option<f64>,

        /// 跳过多模态广告分析
        #[arg(long)]
        skip_analysis: bool,
    },
    /// 只运行跳切检测，把逐采样点的指标以 JSON 输出到标准输出
    Detect {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 配置文件路径（可选）
        #[arg(long)]
        config: Option<PathBuf>,

        /// 跳切检测阈值 (0.0-1.0)
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// 生成带默认值的配置文件
    InitConfig {
        /// 配置文件输出路径
        path: PathBuf,
    },
}

fn init_logging(level: &str) {
    let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Process {
            input,
            output,
            config: config_file,
            threshold,
            max_frames,
            max_duration,
            skip_analysis,
        } => {
            let overrides = ConfigOverrides {
                jump_cut_threshold: threshold,
                max_frames_per_video: max_frames,
                max_video_duration: max_duration,
            };
            let config = ConfigLoader::load_config(config_file.as_deref(), &overrides)
                .context("加载配置失败")?;
            init_logging(&config.log_level);

            tracing::info!(
                "使用配置: threshold={:.2}, max_frames={}, max_duration={:.1}s",
                config.extraction.jump_cut_threshold,
                config.extraction.max_frames_per_video,
                config.extraction.max_video_duration
            );

            let output = process_video(&input, &output, &config, ProcessOptions { skip_analysis })
                .await
                .context("处理视频失败")?;
            tracing::info!(
                "📁 输出: {} ({} 帧)",
                output.output_dir.display(),
                output.frame_files.len()
            );
        }
        Commands::Detect {
            input,
            config: config_file,
            threshold,
        } => {
            let overrides = ConfigOverrides {
                jump_cut_threshold: threshold,
                ..ConfigOverrides::default()
            };
            let config = ConfigLoader::load_config(config_file.as_deref(), &overrides)
                .context("加载配置失败")?;
            init_logging(&config.log_level);

            let extractor = FrameExtractor::new(config.extraction).context("帧提取配置无效")?;
            let mut processor = VideoProcessor::open(&input).context("打开视频失败")?;
            let duration = processor.duration().context("获取视频时长失败")?;
            extractor.check_duration(duration)?;

            let report = JumpCutDetector::new(extractor.config())
                .detect(&mut processor, duration)
                .context("跳切检测失败")?;
            let json = serde_json::to_string_pretty(&report).context("序列化检测结果失败")?;
            println!("{}", json);
        }
        Commands::InitConfig { path } => {
            init_logging("info");
            ConfigLoader::create_default_config(&path)
                .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
            tracing::info!("✅ 已生成配置文件: {}", path.display());
        }
    }

    Ok(())
}
