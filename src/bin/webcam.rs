// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 桌面窗口实时检测 (Webcam Detection)
///
/// 三线程: 解码 → 检测 → 渲染 (macroquad 主线程)
/// cargo run --release --bin webcam -- --classes cup
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cmm_vision::detection::{FrameDetector, ProcessedFrame};
use cmm_vision::detector_config::LabelStyle;
use cmm_vision::display::FrameWindow;
use cmm_vision::input::{CameraDecoder, CapturedFrame, VideoSource};
use cmm_vision::{init_logger, DetectorConfig, Model, ModelArgs, Yolo};
use crossbeam_channel::bounded;
use macroquad::prelude::Conf;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "YOLO 摄像头实时检测", long_about = None)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    /// 摄像头索引, 或视频文件/流地址
    #[arg(short, long, default_value = "0")]
    source: String,

    /// 摄像头分辨率, 例如 1280x720
    #[arg(long)]
    video_size: Option<String>,

    /// 只显示这些类别, 逗号分隔 (默认全部)
    #[arg(long, value_delimiter = ',')]
    classes: Vec<String>,

    /// 水平镜像
    #[arg(long)]
    mirror: bool,

    /// 启用周边商品计数
    #[arg(long)]
    merch: bool,

    /// 检测配置 JSON
    #[arg(long)]
    config: Option<String>,
}

fn window_conf() -> Conf {
    cmm_vision::display::window_conf()
}

#[macroquad::main(window_conf)]
async fn main() {
    init_logger();
    if let Err(e) = run().await {
        log::error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let model = Yolo::new(cli.model)?;
    model.summary();

    let mut config = match &cli.config {
        Some(path) => DetectorConfig::load(path, DetectorConfig::default()),
        None => DetectorConfig::default(),
    };
    config.mirror |= cli.mirror;
    if cli.merch {
        config.merch_enabled = true;
        config.label_style = LabelStyle::Banner;
    }
    if !cli.classes.is_empty() {
        config.target_classes = cli.classes;
    }
    config.print_summary();

    let stop = Arc::new(AtomicBool::new(false));
    let (frame_tx, frame_rx) = bounded::<CapturedFrame>(2);
    let (result_tx, result_rx) = bounded::<ProcessedFrame>(2);

    let decoder = CameraDecoder::new(VideoSource::parse(&cli.source), stop.clone())
        .with_video_size(cli.video_size)
        .spawn(frame_tx)
        .context("无法创建解码线程")?;

    let mut detector = FrameDetector::new(Some(Box::new(model)), config);
    std::thread::Builder::new()
        .name("detector".to_string())
        .spawn(move || {
            while let Ok(frame) = frame_rx.recv() {
                // 只处理最新一帧
                let frame = frame_rx.try_iter().last().unwrap_or(frame);
                if result_tx.send(detector.process(frame.image)).is_err() {
                    break;
                }
            }
            log::info!("✅ 检测线程退出");
        })
        .context("无法创建检测线程")?;

    let result = FrameWindow::new(result_rx).run().await;
    stop.store(true, Ordering::Relaxed);

    if result.is_err() && decoder.is_finished() {
        match decoder.join() {
            Ok(Err(e)) => return Err(e.context("Failed to grab frame")),
            Err(_) => return Err(anyhow!("解码线程异常退出")),
            Ok(Ok(())) => {}
        }
    }
    result
}
