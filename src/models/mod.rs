// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型统一接口与实现
///
/// # 架构说明
///
/// ## Model Trait
/// 统一的模型接口, 定义标准流程: preprocess → run → postprocess
///
/// ## YOLO
/// Ultralytics YOLOv8 / YOLO11 检测模型 (ONNX 输出格式相同: `[batch, 4 + nc, anchors]`)
/// - 模型加载 (new)
/// - 预处理 (letterbox)
/// - 推理 (OrtBackend)
/// - 后处理 (阈值 + 按类别 NMS)
///
/// ## 使用示例
/// ```no_run
/// use cmm_vision::models::{Model, Yolo};
/// use cmm_vision::ModelArgs;
/// # fn demo(args: ModelArgs, images: Vec<image::RgbImage>) -> anyhow::Result<()> {
/// let mut model = Yolo::new(args)?;
/// let results = model.forward(&images)?;
/// # Ok(())
/// # }
/// ```
use anyhow::Result;
use image::RgbImage;
use ndarray::{Array, IxDyn};
use serde::Serialize;

use crate::{DetectionResult, OrtEP};

/// 模型信息 (供 `inspect` 和浏览器界面展示)
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub ep: OrtEP,
    pub width: u32,
    pub height: u32,
    pub names: Vec<String>,
    pub conf: f32,
    pub iou: f32,
}

/// 统一的深度学习模型接口
///
/// ## 核心流程
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测结果
/// ```
pub trait Model: Send {
    /// 预处理: 图片 → NCHW 张量 (支持批量)
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播, 返回原始输出(未解码)
    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 检测结果, 坐标还原到 `xs0` 的尺寸
    fn postprocess(&self, xs: Vec<Array<f32, IxDyn>>, xs0: &[RgbImage])
        -> Result<Vec<DetectionResult>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[RgbImage]) -> Result<Vec<DetectionResult>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs, false)?;
        self.postprocess(ys, images)
    }

    fn names(&self) -> &[String];

    fn conf(&self) -> f32;

    fn set_conf(&mut self, val: f32);

    fn info(&self) -> ModelInfo;

    /// 打印模型信息
    fn summary(&self);
}

pub mod yolo;

pub use yolo::Yolo;
