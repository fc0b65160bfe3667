// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 负责: 会话创建、执行设备选择、输入尺寸与 Ultralytics 元数据解析

use anyhow::{bail, Context, Result};
use ndarray::{Array, IxDyn};
use once_cell::sync::Lazy;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use regex::Regex;
use serde::Serialize;

/// 未指定且模型为动态输入时的默认尺寸
pub const DEFAULT_IMAGE_SIZE: u32 = 640;

static NAMES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#).expect("valid regex"));

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: String,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    /// 显式输入尺寸 (height, width), 仅在模型为动态输入时生效
    pub image_size: (Option<u32>, Option<u32>),
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    inputs: Vec<(String, Vec<i64>)>,
    outputs: Vec<(String, Vec<i64>)>,
    height: u32,
    width: u32,
    height_dynamic: bool,
    width_dynamic: bool,
    names: Option<Vec<String>>,
    task: Option<String>,
    author: Option<String>,
    version: Option<String>,
    metadata: Vec<(String, String)>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        let mut providers: Vec<ExecutionProviderDispatch> = match args.ep {
            OrtEP::Trt(device_id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .with_fp16(args.trt_fp16)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ],
            OrtEP::CUDA(device_id) => vec![CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()],
            OrtEP::CPU => vec![],
        };
        providers.push(CPUExecutionProvider::default().build());

        let session = Session::builder()
            .context("创建 ORT 会话构建器失败")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("设置图优化级别失败")?
            .with_execution_providers(providers)
            .context("注册执行设备失败")?
            .commit_from_file(&args.f)
            .with_context(|| format!("加载 ONNX 模型失败: {}", args.f))?;

        let inputs: Vec<(String, Vec<i64>)> = session
            .inputs
            .iter()
            .map(|i| {
                let dims = i
                    .input_type
                    .tensor_shape()
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();
                (i.name.clone(), dims)
            })
            .collect();
        let outputs: Vec<(String, Vec<i64>)> = session
            .outputs
            .iter()
            .map(|o| {
                let dims = o
                    .output_type
                    .tensor_shape()
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();
                (o.name.clone(), dims)
            })
            .collect();

        // 输入: [batch, 3, height, width]
        let input_dims = match inputs.first() {
            Some((_, dims)) if dims.len() == 4 => dims.clone(),
            Some((name, dims)) => bail!("不支持的输入形状 {}: {:?}, 需要 NCHW", name, dims),
            None => bail!("模型没有输入"),
        };
        let (height, height_dynamic) = resolve_dim(input_dims[2], args.image_size.0);
        let (width, width_dynamic) = resolve_dim(input_dims[3], args.image_size.1);

        // Ultralytics 元数据
        let mut metadata = Vec::new();
        if let Ok(meta) = session.metadata() {
            if let Ok(keys) = meta.custom_keys() {
                for key in keys {
                    if let Ok(Some(value)) = meta.custom(&key) {
                        metadata.push((key, value));
                    }
                }
            }
        }
        let lookup = |key: &str| {
            metadata
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let names = lookup("names").map(|s| parse_names(&s)).filter(|n| !n.is_empty());
        let task = lookup("task");
        let author = lookup("author");
        let version = lookup("version");

        if let Some(task) = &task {
            if task != "detect" {
                bail!("仅支持检测模型, 当前模型任务为: {}", task);
            }
        }

        Ok(Self {
            session,
            ep: args.ep,
            inputs,
            outputs,
            height,
            width,
            height_dynamic,
            width_dynamic,
            names,
            task,
            author,
            version,
            metadata,
        })
    }

    /// 单次前向推理, 返回所有输出 (f16 输出会转换为 f32)
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = std::time::Instant::now();
        let input: DynValue = Tensor::from_array(xs)
            .context("创建输入张量失败")?
            .into_dyn();
        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("ONNX 推理失败")?;
        if profile {
            log::info!("[ORT Inference]: {:?}", t.elapsed());
        }

        let mut ys = Vec::with_capacity(outputs.len());
        for (name, value) in outputs.iter() {
            let y = match value.try_extract_tensor::<f32>() {
                Ok((shape, data)) => to_array(shape, data.to_vec())?,
                Err(_) => {
                    let (shape, data) = value
                        .try_extract_tensor::<half::f16>()
                        .with_context(|| format!("无法读取输出张量 {}", name))?;
                    to_array(shape, data.iter().map(|v| v.to_f32()).collect())?
                }
            };
            ys.push(y);
        }
        Ok(ys)
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_height_dynamic(&self) -> bool {
        self.height_dynamic
    }

    pub fn is_width_dynamic(&self) -> bool {
        self.width_dynamic
    }

    /// 类别数: 优先元数据, 其次输出通道数 - 4
    pub fn nc(&self) -> Option<u32> {
        if let Some(names) = &self.names {
            return Some(names.len() as u32);
        }
        self.outputs
            .first()
            .and_then(|(_, dims)| dims.get(1).copied())
            .filter(|&c| c > 4)
            .map(|c| (c - 4) as u32)
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn inputs(&self) -> &[(String, Vec<i64>)] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[(String, Vec<i64>)] {
        &self.outputs
    }

    pub fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }
}

/// 动态维度(<=0)使用显式值或默认值
fn resolve_dim(dim: i64, explicit: Option<u32>) -> (u32, bool) {
    if dim > 0 {
        (dim as u32, false)
    } else {
        (explicit.unwrap_or(DEFAULT_IMAGE_SIZE), true)
    }
}

fn to_array(shape: &[i64], data: Vec<f32>) -> Result<Array<f32, IxDyn>> {
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    Array::from_shape_vec(IxDyn(&dims), data).context("输出张量形状不匹配")
}

/// 解析 Ultralytics `names` 元数据, 形如 `{0: 'person', 1: 'bicycle'}`
pub fn parse_names(s: &str) -> Vec<String> {
    let mut pairs: Vec<(usize, String)> = NAMES_RE
        .captures_iter(s)
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].to_string())))
        .collect();
    pairs.sort_by_key(|(id, _)| *id);

    let len = pairs.last().map(|(id, _)| id + 1).unwrap_or(0);
    let mut names: Vec<String> = (0..len).map(|i| format!("class{}", i)).collect();
    for (id, name) in pairs {
        names[id] = name;
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        let names = parse_names("{0: 'UNCC HEADGEAR', 1: 'UNCC TORSO', 2: 'UNCC-LOGO'}");
        assert_eq!(names, ["UNCC HEADGEAR", "UNCC TORSO", "UNCC-LOGO"]);
    }

    #[test]
    fn test_parse_names_unordered_with_gap() {
        let names = parse_names(r#"{2: "cup", 0: "person"}"#);
        assert_eq!(names, ["person", "class1", "cup"]);
    }

    #[test]
    fn test_parse_names_empty() {
        assert!(parse_names("{}").is_empty());
        assert!(parse_names("garbage").is_empty());
    }

    #[test]
    fn test_resolve_dim() {
        assert_eq!(resolve_dim(512, Some(640)), (512, false));
        assert_eq!(resolve_dim(-1, Some(320)), (320, true));
        assert_eq!(resolve_dim(-1, None), (DEFAULT_IMAGE_SIZE, true));
    }
}
