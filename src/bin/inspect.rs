// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型信息查看 (Model Inspection)
///
/// cargo run --bin inspect -- --model CMM-Yolo11.onnx --json
use anyhow::Result;
use clap::Parser;
use cmm_vision::{init_logger, Model, ModelArgs, ModelInfo, Yolo};
use mimalloc::MiMalloc;
use serde::Serialize;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "打印 ONNX 模型输入/输出/元数据", long_about = None)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    /// 以 JSON 输出
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    info: ModelInfo,
    task: Option<&'a str>,
    author: Option<&'a str>,
    version: Option<&'a str>,
    inputs: &'a [(String, Vec<i64>)],
    outputs: &'a [(String, Vec<i64>)],
    metadata: &'a [(String, String)],
}

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let model = Yolo::new(cli.model)?;
    let engine = model.engine();
    let report = Report {
        info: model.info(),
        task: engine.task(),
        author: engine.author(),
        version: engine.version(),
        inputs: engine.inputs(),
        outputs: engine.outputs(),
        metadata: engine.metadata(),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("📦 模型: {}", report.info.path);
    println!("  任务: {}", report.task.unwrap_or("-"));
    println!("  作者: {}", report.author.unwrap_or("-"));
    println!("  版本: {}", report.version.unwrap_or("-"));
    println!("  执行: {:?}", report.info.ep);
    println!("🔢 输入:");
    for (name, shape) in report.inputs {
        println!("  {} {:?}", name, shape);
    }
    println!("🔢 输出:");
    for (name, shape) in report.outputs {
        println!("  {} {:?}", name, shape);
    }
    println!("🗂️ 元数据:");
    for (key, value) in report.metadata {
        println!("  {}: {}", key, value);
    }
    println!("🏷️ 类别 ({}):", report.info.names.len());
    for (i, name) in report.info.names.iter().enumerate() {
        println!("  {:>3}: {}", i, name);
    }
    Ok(())
}
