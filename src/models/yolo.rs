// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 / YOLO11 检测模型实现
// 包含: 模型加载、letterbox 预处理、推理、后处理

use anyhow::{bail, Context, Result};
use image::{imageops, RgbImage};
use ndarray::{s, Array, ArrayView2, Axis, IxDyn};

use crate::models::{Model, ModelInfo};
use crate::{non_max_suppression, Bbox, DetectionResult, ModelArgs, OrtBackend, OrtEP};

const CXYWH_OFFSET: usize = 4;
/// letterbox 填充灰度 (Ultralytics 114)
const PAD_VALUE: f32 = 114.0 / 255.0;

/// YOLO 检测模型结构
pub struct Yolo {
    engine: OrtBackend,
    path: String,
    nc: u32,
    height: u32,
    width: u32,
    conf: f32,
    iou: f32,
    max_det: usize,
    names: Vec<String>,
    profile: bool,
}

impl Yolo {
    /// 从配置创建模型
    pub fn new(config: ModelArgs) -> Result<Self> {
        let path = crate::download::resolve_model(&config.model)?;

        // execution provider
        let ep = if config.trt {
            OrtEP::Trt(config.device_id)
        } else if config.cuda {
            OrtEP::CUDA(config.device_id)
        } else {
            OrtEP::CPU
        };

        let engine = OrtBackend::build(crate::OrtConfig {
            f: path.clone(),
            ep,
            trt_fp16: config.fp16,
            image_size: (config.height, config.width),
        })?;

        let (height, width) = (engine.height(), engine.width());
        let nc = match engine.nc().or(config.nc) {
            Some(nc) => nc,
            None => bail!("无法获取类别数, 请通过 `--nc` 显式指定"),
        };

        // class names
        let names = match engine.names() {
            Some(names) => names,
            None => (0..nc).map(|i| format!("class{}", i)).collect(),
        };

        Ok(Self {
            engine,
            path,
            nc,
            height,
            width,
            conf: config.conf,
            iou: config.iou,
            max_det: config.max_det,
            names,
            profile: config.profile,
        })
    }

    pub fn engine(&self) -> &OrtBackend {
        &self.engine
    }

    pub fn iou(&self) -> f32 {
        self.iou
    }

    pub fn set_iou(&mut self, val: f32) {
        self.iou = val;
    }

    pub fn nc(&self) -> u32 {
        self.nc
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Model for Yolo {
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        let t = std::time::Instant::now();
        let ys = letterbox(images, self.width, self.height);
        if self.profile {
            log::info!("[Model Preprocess]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(xs, profile || self.profile)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[RgbImage],
    ) -> Result<Vec<DetectionResult>> {
        let t = std::time::Instant::now();
        let preds = xs.first().context("模型没有输出")?;
        if preds.ndim() != 3 {
            bail!("不支持的输出形状: {:?}", preds.shape());
        }

        let nc = self.nc as usize;
        let mut ys = Vec::with_capacity(xs0.len());
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let Some(img) = xs0.get(idx) else { break };
            let anchor = anchor.into_dimensionality::<ndarray::Ix2>()?;

            // [4 + nc, anchors], 部分导出为转置的 [anchors, 4 + nc]
            let anchor = if anchor.shape()[0] == CXYWH_OFFSET + nc {
                anchor
            } else if anchor.shape()[1] == CXYWH_OFFSET + nc {
                anchor.reversed_axes()
            } else {
                bail!("输出形状 {:?} 与类别数 {} 不匹配", preds.shape(), nc);
            };

            let (w0, h0) = (img.width() as f32, img.height() as f32);
            let ratio = (self.width as f32 / w0).min(self.height as f32 / h0);
            let mut bboxes = decode(anchor, nc, ratio, (w0, h0), self.conf);
            non_max_suppression(&mut bboxes, self.iou);
            bboxes.truncate(self.max_det);
            ys.push(DetectionResult::new(bboxes));
        }

        if self.profile {
            log::info!("[Model Postprocess]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn conf(&self) -> f32 {
        self.conf
    }

    fn set_conf(&mut self, val: f32) {
        self.conf = val;
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            path: self.path.clone(),
            ep: *self.engine.ep(),
            width: self.width,
            height: self.height,
            names: self.names.clone(),
            conf: self.conf,
            iou: self.iou,
        }
    }

    fn summary(&self) {
        log::info!(
            "\nSummary:\n\
            > Model: {}{}\n\
            > EP: {:?} {}\n\
            > Height: {} ({}), Width: {} ({})\n\
            > nc: {}, conf: {}, iou: {}, max_det: {}\n\
            > names: {:?}\n",
            self.path,
            match self.engine.author().zip(self.engine.version()) {
                Some((author, ver)) => format!(" ({} {})", author, ver),
                None => String::new(),
            },
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                "(May still fall back to CPU)"
            },
            self.height,
            if self.engine.is_height_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.width,
            if self.engine.is_width_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.nc,
            self.conf,
            self.iou,
            self.max_det,
            self.names,
        );
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// letterbox: 等比缩放后贴在左上角, 其余填充灰色, 输出 NCHW [0, 1]
pub fn letterbox(images: &[RgbImage], width: u32, height: u32) -> Array<f32, IxDyn> {
    let mut ys = Array::from_elem((images.len(), 3, height as usize, width as usize), PAD_VALUE);
    for (idx, x) in images.iter().enumerate() {
        let (_, w_new, h_new) = scale_wh(
            x.width() as f32,
            x.height() as f32,
            width as f32,
            height as f32,
        );
        let w_new = (w_new as u32).clamp(1, width);
        let h_new = (h_new as u32).clamp(1, height);
        let img = if (w_new, h_new) == x.dimensions() {
            x.clone()
        } else {
            imageops::resize(x, w_new, h_new, imageops::FilterType::Triangle)
        };

        let mut view = ys.slice_mut(s![idx, .., .., ..]);
        for (px, py, rgb) in img.enumerate_pixels() {
            let (px, py) = (px as usize, py as usize);
            let [r, g, b] = rgb.0;
            view[[0, py, px]] = r as f32 / 255.0;
            view[[1, py, px]] = g as f32 / 255.0;
            view[[2, py, px]] = b as f32 / 255.0;
        }
    }
    ys.into_dyn()
}

/// 解码单张图片的预测 `[4 + nc, anchors]`, 坐标除以 `ratio` 还原并裁剪到原图
pub fn decode(
    preds: ArrayView2<f32>,
    nc: usize,
    ratio: f32,
    (width_original, height_original): (f32, f32),
    conf: f32,
) -> Vec<Bbox> {
    let mut data = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);
        let Some((id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        if confidence <= conf {
            continue;
        }

        let cx = pred[0] / ratio;
        let cy = pred[1] / ratio;
        let w = pred[2] / ratio;
        let h = pred[3] / ratio;
        let x1 = (cx - w / 2.).clamp(0., width_original);
        let y1 = (cy - h / 2.).clamp(0., height_original);
        let x2 = (cx + w / 2.).clamp(0., width_original);
        let y2 = (cy + h / 2.).clamp(0., height_original);
        data.push(Bbox::from_xyxy(x1, y1, x2, y2, id, confidence));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_letterbox_wide_image() {
        let img = RgbImage::from_pixel(64, 32, image::Rgb([255, 0, 0]));
        let ys = letterbox(&[img], 32, 32);
        assert_eq!(ys.shape(), &[1, 3, 32, 32]);
        // 缩放后 32x16 贴在左上角
        assert_eq!(ys[[0, 0, 0, 0]], 1.0);
        assert_eq!(ys[[0, 1, 0, 0]], 0.0);
        assert_eq!(ys[[0, 0, 15, 31]], 1.0);
        // 下半部分为填充
        assert_eq!(ys[[0, 0, 16, 0]], PAD_VALUE);
        assert_eq!(ys[[0, 2, 31, 31]], PAD_VALUE);
    }

    #[test]
    fn test_decode_scales_and_filters() {
        // 2 类别, 3 个 anchor
        let mut preds = Array2::<f32>::zeros((6, 3));
        // anchor 0: 类别1 高分
        preds.column_mut(0).assign(&ndarray::arr1(&[50., 50., 20., 40., 0.1, 0.9]));
        // anchor 1: 低分, 丢弃
        preds.column_mut(1).assign(&ndarray::arr1(&[10., 10., 5., 5., 0.2, 0.1]));
        // anchor 2: 越界, 裁剪
        preds.column_mut(2).assign(&ndarray::arr1(&[5., 5., 20., 20., 0.8, 0.3]));

        let boxes = decode(preds.view(), 2, 0.5, (200., 200.), 0.25);
        assert_eq!(boxes.len(), 2);

        let b = &boxes[0];
        assert_eq!(b.id(), 1);
        assert_eq!((b.xmin(), b.ymin(), b.xmax(), b.ymax()), (80., 60., 120., 140.));

        let c = &boxes[1];
        assert_eq!(c.id(), 0);
        assert_eq!((c.xmin(), c.ymin()), (0., 0.));
        assert_eq!((c.xmax(), c.ymax()), (30., 30.));
    }

    #[test]
    fn test_decode_drops_score_equal_to_conf() {
        let mut preds = Array2::<f32>::zeros((5, 2));
        preds.column_mut(0).assign(&ndarray::arr1(&[50., 50., 10., 10., 0.5]));
        preds.column_mut(1).assign(&ndarray::arr1(&[80., 80., 10., 10., 0.5001]));

        let boxes = decode(preds.view(), 1, 1.0, (200., 200.), 0.5);
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].confidence() > 0.5);
    }

    #[test]
    fn test_scale_wh() {
        let (r, w, h) = scale_wh(1280., 720., 640., 640.);
        assert_eq!(r, 0.5);
        assert_eq!((w, h), (640., 360.));
    }
}
