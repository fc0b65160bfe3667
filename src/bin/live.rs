// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 浏览器实时检测 + 周边商品计数 (Live UI)
///
/// cargo run --release --bin live -- --bind 127.0.0.1:7860
use anyhow::Result;
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use cmm_vision::detection::FrameDetector;
use cmm_vision::live::server::{DEFAULT_BIND, DEFAULT_JPEG_QUALITY};
use cmm_vision::live::LiveServer;
use cmm_vision::{init_logger, DetectorConfig, Model, ModelArgs, Yolo};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 浏览器界面未显式指定 `--conf` 时的置信度阈值
const LIVE_CONF: f32 = 0.75;

#[derive(Parser, Debug)]
#[command(author, version, about = "UNCC 周边商品实时检测 (浏览器)", long_about = None)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    /// 监听地址
    #[arg(long, default_value = DEFAULT_BIND)]
    bind: String,

    /// 检测配置 JSON (不存在时自动创建)
    #[arg(long, default_value = "detector.json")]
    config: String,

    /// HTTP 工作线程数
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// 返回画面的 JPEG 质量
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    jpeg_quality: u8,
}

fn main() -> Result<()> {
    init_logger();
    let matches = Cli::command().get_matches();
    let mut cli = Cli::from_arg_matches(&matches)?;
    if matches.value_source("conf") == Some(ValueSource::DefaultValue) {
        cli.model.conf = LIVE_CONF;
    }

    let config = DetectorConfig::load(&cli.config, DetectorConfig::live());
    config.print_summary();

    let model: Option<Box<dyn Model>> = match Yolo::new(cli.model) {
        Ok(model) => {
            model.summary();
            Some(Box::new(model))
        }
        Err(e) => {
            log::error!("❌ 模型加载失败: {:#}", e);
            log::warn!("⚠️ 未加载模型, 仅返回原始画面");
            None
        }
    };

    let server = LiveServer::bind(&cli.bind, FrameDetector::new(model, config), cli.jpeg_quality)?;
    server.run(cli.workers)
}
