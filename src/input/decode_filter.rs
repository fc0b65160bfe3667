// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;

use super::CapturedFrame;

// AVPixelFormat 取值 (libavutil/pixfmt.h)
const AV_PIX_FMT_YUV420P: i32 = 0;
const AV_PIX_FMT_RGB24: i32 = 2;

/// FFmpeg解码过滤器: 视频帧 → RgbImage → 通道
#[derive(Clone)]
pub struct DecodeFilter {
    tx: Sender<CapturedFrame>,
    stop: Arc<AtomicBool>,
    frame_id: u64,
    count: usize,
    last: Instant,
    current_fps: f64,
    dropped_frames: usize, // 丢弃的帧数 (消费端跟不上或帧损坏)
    total_frames: usize,
}

impl DecodeFilter {
    pub fn new(tx: Sender<CapturedFrame>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop,
            frame_id: 0,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            log::warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }

    fn update_fps(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.count as f64 / elapsed;
            let drop_rate = self.dropped_frames as f64 / self.total_frames.max(1) as f64 * 100.0;
            log::info!(
                "📺 解码统计: {:.1}fps | 总帧{} | 丢弃{} ({:.1}%)",
                self.current_fps,
                self.total_frames,
                self.dropped_frames,
                drop_rate
            );
            self.last = Instant::now();
            self.count = 0;
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        log::info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        if self.stop.load(Ordering::Relaxed) {
            return Err("decoder stopped".to_string());
        }
        self.total_frames += 1;

        let image = unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.drop_frame("空帧/损坏帧");
                return Ok(None);
            }

            let av = &*frame.as_ptr();
            let Some((w, h)) = frame_dimensions(av.width, av.height) else {
                self.drop_frame(&format!("非法分辨率 {}x{}", av.width, av.height));
                return Ok(None);
            };

            match av.format {
                AV_PIX_FMT_RGB24 => {
                    let stride = av.linesize[0] as usize;
                    if av.data[0].is_null() || stride < w * 3 {
                        self.drop_frame("RGB 数据指针/步长异常");
                        return Ok(None);
                    }
                    let len = stride * (h - 1) + w * 3;
                    let data = std::slice::from_raw_parts(av.data[0], len);
                    copy_packed_rgb(data, stride, w, h)
                }
                AV_PIX_FMT_YUV420P => {
                    let y_stride = av.linesize[0] as usize;
                    let uv_stride = av.linesize[1] as usize;
                    if av.data[0].is_null()
                        || av.data[1].is_null()
                        || av.data[2].is_null()
                        || y_stride < w
                        || uv_stride < w.div_ceil(2)
                    {
                        self.drop_frame("YUV 数据指针/步长异常");
                        return Ok(None);
                    }
                    let uv_h = h.div_ceil(2);
                    let y = std::slice::from_raw_parts(av.data[0], y_stride * h);
                    let u = std::slice::from_raw_parts(av.data[1], uv_stride * uv_h);
                    let v = std::slice::from_raw_parts(av.data[2], uv_stride * uv_h);
                    yuv420p_to_rgb(y, u, v, y_stride, uv_stride, w, h)
                }
                other => {
                    self.drop_frame(&format!("不支持的像素格式 {}", other));
                    return Ok(None);
                }
            }
        };

        let Some(image) = image else {
            self.drop_frame("帧缓冲长度不足");
            return Ok(None);
        };

        self.update_fps();
        self.frame_id += 1;
        let captured = CapturedFrame {
            image,
            frame_id: self.frame_id,
            decode_fps: self.current_fps,
        };

        match self.tx.try_send(captured) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped_frames += 1,
            Err(TrySendError::Disconnected(_)) => {
                return Err("frame receiver closed".to_string());
            }
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        log::info!("✅ 解码线程退出");
    }
}

/// 帧尺寸, 非正数时返回 None
pub fn frame_dimensions(width: i32, height: i32) -> Option<(usize, usize)> {
    if width <= 0 || height <= 0 {
        return None;
    }
    Some((width as usize, height as usize))
}

/// 按行拷贝带步长的 RGB24 数据
pub fn copy_packed_rgb(data: &[u8], stride: usize, width: usize, height: usize) -> Option<RgbImage> {
    let row = width * 3;
    if height == 0 || data.len() < stride * (height - 1) + row {
        return None;
    }
    let mut buf = Vec::with_capacity(row * height);
    for y in 0..height {
        buf.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    RgbImage::from_raw(width as u32, height as u32, buf)
}

/// YUV420P → RGB (BT.601 定点系数)
pub fn yuv420p_to_rgb(
    y_plane: &[u8],
    u_plane: &[u8],
    v_plane: &[u8],
    y_stride: usize,
    uv_stride: usize,
    width: usize,
    height: usize,
) -> Option<RgbImage> {
    if y_plane.len() < y_stride * height {
        return None;
    }
    let uv_len = uv_stride * height.div_ceil(2);
    if u_plane.len() < uv_len || v_plane.len() < uv_len {
        return None;
    }

    let mut buf = vec![0u8; width * height * 3];
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = y_plane[y_row + x] as i32;
            let u_val = u_plane[uv_row + (x >> 1)] as i32 - 128;
            let v_val = v_plane[uv_row + (x >> 1)] as i32 - 128;

            buf[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            buf[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            buf[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
    RgbImage::from_raw(width as u32, height as u32, buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_packed_rgb_skips_padding() {
        // 2x2, 每行填充 2 字节
        let data = [1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12];
        let img = copy_packed_rgb(&data, 8, 2, 2).unwrap();
        assert_eq!(img.as_raw(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_frame_dimensions() {
        assert_eq!(frame_dimensions(7680, 4320), Some((7680, 4320)));
        assert_eq!(frame_dimensions(0, 720), None);
        assert_eq!(frame_dimensions(1280, -1), None);
    }

    #[test]
    fn test_copy_packed_rgb_wide_frame() {
        // 8K 宽度的单行
        let (w, stride) = (7680usize, 7680 * 3 + 64);
        let mut data = vec![0u8; stride];
        data[(w - 1) * 3..w * 3].copy_from_slice(&[9, 8, 7]);
        let img = copy_packed_rgb(&data, stride, w, 1).unwrap();
        assert_eq!(img.dimensions(), (7680, 1));
        assert_eq!(img.get_pixel(7679, 0).0, [9, 8, 7]);
    }

    #[test]
    fn test_copy_packed_rgb_short_buffer() {
        assert!(copy_packed_rgb(&[0; 5], 6, 2, 1).is_none());
    }

    #[test]
    fn test_yuv420p_gray() {
        let y = [128u8; 4 * 2];
        let uv = [128u8; 2];
        let img = yuv420p_to_rgb(&y, &uv, &uv, 4, 2, 4, 2).unwrap();
        assert!(img.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn test_yuv420p_red_dominant() {
        let y = [76u8; 4];
        let u = [85u8; 1];
        let v = [255u8; 1];
        let img = yuv420p_to_rgb(&y, &u, &v, 2, 1, 2, 2).unwrap();
        let [r, g, b] = img.get_pixel(0, 0).0;
        assert!(r > 240 && g < 20 && b < 20, "{:?}", (r, g, b));
    }
}
