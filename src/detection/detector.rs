// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 逐帧检测器 (FrameDetector)
//! 职责: 原始帧 → 镜像/缩放 → YOLO检测 → 坐标还原 → 过滤/周边计数 → 叠加绘制

use std::time::Instant;

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::{imageops, RgbImage};
use serde::Serialize;

use super::filter::retain_classes;
use super::merch::{find_merch, pad_box};
use crate::annotate::Annotator;
use crate::{Bbox, Detection, DetectorConfig, Model, PixelRect};

/// 单帧处理结果
pub struct ProcessedFrame {
    pub image: RgbImage,
    pub detections: Vec<Detection>,
    /// 外扩后的周边商品框, 每个 (logo, 宿主) 匹配对一个
    pub merch: Vec<PixelRect>,
    pub inference_ms: f64,
    pub fps: f64,
}

impl ProcessedFrame {
    pub fn merch_count(&self) -> usize {
        self.merch.len()
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            width: self.image.width(),
            height: self.image.height(),
            merch_count: self.merch_count(),
            inference_ms: self.inference_ms,
            fps: self.fps,
            detections: self.detections.clone(),
        }
    }
}

/// 单帧统计 (浏览器界面 JSON)
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameStats {
    pub width: u32,
    pub height: u32,
    pub merch_count: usize,
    pub inference_ms: f64,
    pub fps: f64,
    pub detections: Vec<Detection>,
}

pub struct FrameDetector {
    model: Option<Box<dyn Model>>,
    config: DetectorConfig,
    annotator: Annotator,
    resizer: fr::Resizer,

    // 统计
    count: u64,
    last: Instant,
    current_fps: f64,
}

impl FrameDetector {
    pub fn new(model: Option<Box<dyn Model>>, config: DetectorConfig) -> Self {
        let annotator = Annotator::new(&config);
        Self::with_annotator(model, config, annotator)
    }

    pub fn with_annotator(
        model: Option<Box<dyn Model>>,
        config: DetectorConfig,
        annotator: Annotator,
    ) -> Self {
        Self {
            model,
            config,
            annotator,
            resizer: fr::Resizer::new(),
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.model.as_deref()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 处理一帧; 推理出错时记录日志并返回未标注的画面
    pub fn process(&mut self, mut frame: RgbImage) -> ProcessedFrame {
        if self.config.mirror {
            imageops::flip_horizontal_in_place(&mut frame);
        }

        let start = Instant::now();
        let detections = match self.infer(&frame) {
            Ok(Some(detections)) => detections,
            Ok(None) => return self.unannotated(frame),
            Err(e) => {
                log::error!("❌ 推理失败: {:#}", e);
                return self.unannotated(frame);
            }
        };
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let merch = if self.config.merch_enabled {
            find_merch(&detections, &self.config.merch_classes)
                .iter()
                .map(|r| pad_box(r, self.config.merch_padding, frame.width(), frame.height()))
                .collect()
        } else {
            Vec::new()
        };

        self.annotator.draw_detections(&mut frame, &detections);
        if self.config.merch_enabled {
            self.annotator.draw_merch(&mut frame, &merch);
            self.annotator.draw_count(&mut frame, merch.len());
        }

        self.tick(detections.len(), merch.len(), inference_ms);

        ProcessedFrame {
            image: frame,
            detections,
            merch,
            inference_ms,
            fps: self.current_fps,
        }
    }

    fn unannotated(&self, frame: RgbImage) -> ProcessedFrame {
        ProcessedFrame {
            image: frame,
            detections: Vec::new(),
            merch: Vec::new(),
            inference_ms: 0.0,
            fps: self.current_fps,
        }
    }

    /// 没有模型时返回 `None`
    fn infer(&mut self, frame: &RgbImage) -> Result<Option<Vec<Detection>>> {
        if self.model.is_none() {
            return Ok(None);
        }

        // 宽度超过 target_width 时仅为推理缩小
        let (w, h) = frame.dimensions();
        let mut scale = self.config.target_width as f32 / w as f32;
        let resized = if scale < 1.0 {
            let new_h = ((h as f32 * scale).round() as u32).max(1);
            Some(self.downscale(frame, self.config.target_width, new_h)?)
        } else {
            scale = 1.0;
            None
        };

        let Some(model) = self.model.as_mut() else {
            return Ok(None);
        };
        let input = resized.unwrap_or_else(|| frame.clone());
        let results = model.forward(std::slice::from_ref(&input))?;

        let mut detections = Vec::new();
        for result in &results {
            for det in result.labeled(model.names()) {
                let bbox = map_to_frame(&det.bbox, scale);
                detections.push(Detection::new(det.name, bbox));
            }
        }
        retain_classes(&mut detections, &self.config.target_classes);
        Ok(Some(detections))
    }

    fn downscale(&mut self, img: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
        let src = fr::images::ImageRef::new(img.width(), img.height(), img.as_raw(), fr::PixelType::U8x3)
            .context("创建缩放源图像失败")?;
        let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .context("推理图像缩放失败")?;
        RgbImage::from_raw(width, height, dst.into_vec()).context("RGB图像转换失败")
    }

    fn tick(&mut self, n_det: usize, n_merch: usize, inference_ms: f64) {
        self.count += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.count as f64 / elapsed;
            self.count = 0;
            self.last = now;
            log::info!(
                "🎯 检测: {}个目标 | 周边: {} | {:.1}ms/帧 | {:.1}fps",
                n_det,
                n_merch,
                inference_ms,
                self.current_fps
            );
        }
    }
}

/// 推理坐标 → 原始帧坐标: 先截断为整数, 再除以缩放比例并截断
fn map_to_frame(bbox: &Bbox, scale: f32) -> Bbox {
    let r = bbox.to_pixel_rect();
    let map = |v: i32| -> f32 {
        if scale == 1.0 {
            v as f32
        } else {
            ((v as f32 / scale) as i32) as f32
        }
    };
    Bbox::from_xyxy(
        map(r.x1),
        map(r.y1),
        map(r.x2),
        map(r.y2),
        bbox.id(),
        bbox.confidence(),
    )
}
