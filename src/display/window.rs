// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! macroquad 桌面窗口
//!
//! 检测线程把已标注的 `ProcessedFrame` 投递到通道, 窗口每帧只取最新一帧上传为纹理。

use std::time::Instant;

use anyhow::{bail, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use image::RgbImage;
use macroquad::prelude::*;

use crate::detection::ProcessedFrame;

pub const WINDOW_TITLE: &str = "Filtered YOLO Detection";

pub fn window_conf() -> Conf {
    Conf {
        window_title: WINDOW_TITLE.to_string(),
        window_width: 1280,
        window_height: 720,
        high_dpi: true,
        ..Default::default()
    }
}

pub struct FrameWindow {
    rx: Receiver<ProcessedFrame>,
    texture: Option<Texture2D>,
    source_closed: bool,
    infer_fps: f64,
    inference_ms: f64,
    detections: usize,
    render_count: u64,
    render_last: Instant,
    render_fps: f64,
}

impl FrameWindow {
    pub fn new(rx: Receiver<ProcessedFrame>) -> Self {
        Self {
            rx,
            texture: None,
            source_closed: false,
            infer_fps: 0.0,
            inference_ms: 0.0,
            detections: 0,
            render_count: 0,
            render_last: Instant::now(),
            render_fps: 0.0,
        }
    }

    /// 窗口主循环, 视频源结束时返回错误
    pub async fn run(mut self) -> Result<()> {
        prevent_quit();
        loop {
            if is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape) || is_quit_requested()
            {
                log::info!("👋 窗口关闭");
                return Ok(());
            }

            self.update();
            if self.source_closed {
                bail!("Failed to grab frame");
            }
            self.draw();
            next_frame().await;
        }
    }

    /// 取通道中最新一帧, 丢弃积压的旧帧
    fn update(&mut self) {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.source_closed = latest.is_none();
                    break;
                }
            }
        }

        let Some(frame) = latest else { return };
        self.infer_fps = frame.fps;
        self.inference_ms = frame.inference_ms;
        self.detections = frame.detections.len();
        self.upload(&frame.image);
    }

    /// 只在分辨率变化时重建纹理, 否则原地更新像素
    fn upload(&mut self, img: &RgbImage) {
        let (w, h) = (img.width() as u16, img.height() as u16);
        let bytes = rgb_to_rgba(img);

        match &self.texture {
            Some(tex) if tex.width() == w as f32 && tex.height() == h as f32 => {
                tex.update(&Image {
                    bytes,
                    width: w,
                    height: h,
                });
            }
            _ => {
                let texture = Texture2D::from_rgba8(w, h, &bytes);
                texture.set_filter(FilterMode::Linear);
                self.texture = Some(texture);
            }
        }
    }

    fn draw(&mut self) {
        clear_background(BLACK);

        if let Some(texture) = &self.texture {
            let (x, y, w, h) = fit_rect(
                texture.width(),
                texture.height(),
                screen_width(),
                screen_height(),
            );
            draw_texture_ex(
                texture,
                x,
                y,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(w, h)),
                    ..Default::default()
                },
            );
        } else {
            draw_text("Waiting for camera...", 20.0, 40.0, 28.0, WHITE);
        }

        self.render_count += 1;
        let elapsed = self.render_last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.render_fps = self.render_count as f64 / elapsed;
            self.render_count = 0;
            self.render_last = Instant::now();
        }

        let status = format!(
            "FPS: {:.1} | Render: {:.0} | {:.1} ms | {} objects",
            self.infer_fps, self.render_fps, self.inference_ms, self.detections
        );
        draw_text(&status, 10.0, screen_height() - 12.0, 22.0, YELLOW);
    }
}

/// 保持宽高比居中放入窗口, 返回 (x, y, w, h)
pub fn fit_rect(tex_w: f32, tex_h: f32, screen_w: f32, screen_h: f32) -> (f32, f32, f32, f32) {
    if tex_w <= 0.0 || tex_h <= 0.0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let scale = (screen_w / tex_w).min(screen_h / tex_h);
    let (w, h) = (tex_w * scale, tex_h * scale);
    ((screen_w - w) / 2.0, (screen_h - h) / 2.0, w, h)
}

pub fn rgb_to_rgba(img: &RgbImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(img.as_raw().len() / 3 * 4);
    for px in img.as_raw().chunks_exact(3) {
        out.extend_from_slice(px);
        out.push(255);
    }
    out
}
