// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 图片检测 (Image Detection)
///
/// cargo run --release --bin detect -- --source bus.jpg --merch
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cmm_vision::detection::FrameDetector;
use cmm_vision::detector_config::LabelStyle;
use cmm_vision::{gen_time_string, init_logger, DetectorConfig, Model, ModelArgs, Yolo};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "YOLO 图片检测", long_about = None)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    /// 输入图片
    #[arg(short, long)]
    source: String,

    /// 启用周边商品计数
    #[arg(long)]
    merch: bool,

    /// 只保留这些类别, 逗号分隔
    #[arg(long, value_delimiter = ',')]
    classes: Vec<String>,

    /// 检测配置 JSON
    #[arg(long)]
    config: Option<String>,

    /// 输出目录
    #[arg(short, long, default_value = "runs/detect")]
    output: String,

    /// 不保存结果图片
    #[arg(long)]
    nosave: bool,
}

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let model = Yolo::new(cli.model)?;
    model.summary();

    let mut config = match &cli.config {
        Some(path) => DetectorConfig::load(path, DetectorConfig::default()),
        None => DetectorConfig::default(),
    };
    if cli.merch {
        config.merch_enabled = true;
        config.label_style = LabelStyle::Banner;
    }
    if !cli.classes.is_empty() {
        config.target_classes = cli.classes;
    }
    config.print_summary();

    let image = image::open(&cli.source)
        .with_context(|| format!("无法打开图片 {}", cli.source))?
        .to_rgb8();

    let mut detector = FrameDetector::new(Some(Box::new(model)), config);
    let processed = detector.process(image);

    println!(
        "🔍 {}: {} 个目标, {:.1}ms",
        cli.source,
        processed.detections.len(),
        processed.inference_ms
    );
    for det in &processed.detections {
        let r = det.rect();
        println!(
            "  {:<16} {:.2}  [{}, {}, {}, {}]",
            det.name,
            det.confidence(),
            r.x1,
            r.y1,
            r.x2,
            r.y2
        );
    }
    if detector.config().merch_enabled {
        println!("👕 周边商品: {}", processed.merch_count());
    }

    if !cli.nosave {
        fs::create_dir_all(&cli.output)
            .with_context(|| format!("无法创建输出目录 {}", cli.output))?;
        let path = Path::new(&cli.output).join(format!("{}.jpg", gen_time_string("-")));
        processed
            .image
            .save(&path)
            .with_context(|| format!("无法保存 {}", path.display()))?;
        log::info!("💾 结果已保存: {}", path.display());
    }
    Ok(())
}
