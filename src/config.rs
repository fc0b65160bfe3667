// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 模型配置参数 (各可执行文件共用)

use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// ONNX 模型路径或 http(s) 地址
    #[arg(short, long, default_value = "CMM-Yolo11.onnx")]
    pub model: String,

    /// 使用 CUDA 执行
    #[arg(long)]
    pub cuda: bool,

    /// 使用 TensorRT 执行 (失败时回退 CUDA/CPU)
    #[arg(long)]
    pub trt: bool,

    /// TensorRT 启用 fp16
    #[arg(long)]
    pub fp16: bool,

    /// GPU 设备编号
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 动态输入模型的高度
    #[arg(long)]
    pub height: Option<u32>,

    /// 动态输入模型的宽度
    #[arg(long)]
    pub width: Option<u32>,

    /// 置信度阈值
    #[arg(long, default_value_t = 0.25)]
    pub conf: f32,

    /// NMS IoU 阈值
    #[arg(long, default_value_t = 0.7)]
    pub iou: f32,

    /// 每张图片最多保留的检测框
    #[arg(long, default_value_t = 300)]
    pub max_det: usize,

    /// 模型元数据缺失时指定类别数
    #[arg(long)]
    pub nc: Option<u32>,

    /// 打印各阶段耗时
    #[arg(long)]
    pub profile: bool,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            model: "CMM-Yolo11.onnx".to_string(),
            cuda: false,
            trt: false,
            fp16: false,
            device_id: 0,
            height: None,
            width: None,
            conf: 0.25,
            iou: 0.7,
            max_det: 300,
            nc: None,
            profile: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        model: ModelArgs,
    }

    #[test]
    fn test_defaults_match_cli() {
        let cli = Cli::parse_from(["test"]);
        let d = ModelArgs::default();
        assert_eq!(cli.model.model, d.model);
        assert_eq!(cli.model.conf, d.conf);
        assert_eq!(cli.model.iou, d.iou);
        assert_eq!(cli.model.max_det, d.max_det);
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from(["test", "-m", "best.onnx", "--cuda", "--conf", "0.75"]);
        assert_eq!(cli.model.model, "best.onnx");
        assert!(cli.model.cuda);
        assert_eq!(cli.model.conf, 0.75);
    }
}
