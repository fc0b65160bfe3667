// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 摄像头/视频输入 - 独立解码线程
//!
//! 本地摄像头支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux),
//! 也可以直接打开视频文件或网络流地址。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, Result};
use crossbeam_channel::Sender;
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};

use super::decode_filter::DecodeFilter;
use super::{CapturedFrame, VideoSource};

const MAX_RETRIES: usize = 3;

#[cfg(target_os = "windows")]
const CAMERA_FORMAT: &str = "dshow";
#[cfg(target_os = "macos")]
const CAMERA_FORMAT: &str = "avfoundation";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const CAMERA_FORMAT: &str = "v4l2";

/// 摄像头解码器
pub struct CameraDecoder {
    source: VideoSource,
    stop: Arc<AtomicBool>,
    video_size: Option<String>,
}

impl CameraDecoder {
    pub fn new(source: VideoSource, stop: Arc<AtomicBool>) -> Self {
        Self {
            source,
            stop,
            video_size: None,
        }
    }

    /// 请求摄像头分辨率, 例如 "1280x720"
    pub fn with_video_size(mut self, size: Option<String>) -> Self {
        self.video_size = size;
        self
    }

    /// 在独立线程中解码
    pub fn spawn(mut self, tx: Sender<CapturedFrame>) -> std::io::Result<JoinHandle<Result<()>>> {
        std::thread::Builder::new()
            .name("decoder".to_string())
            .spawn(move || self.run(tx))
    }

    /// 阻塞解码, 直到输入结束或停止标志被置位
    pub fn run(&mut self, tx: Sender<CapturedFrame>) -> Result<()> {
        log::info!("🎥 视频源: {}", self.source);
        let filter = DecodeFilter::new(tx, self.stop.clone());
        let mut retry_count = 0;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }

            let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
            let pipe = pipe.filter("decode", Box::new(filter.clone()));
            let out = create_null_output().add_frame_pipeline(pipe);

            let ctx = match FfmpegContext::builder()
                .input(self.input())
                .filter_desc("format=rgb24")
                .output(out)
                .build()
            {
                Ok(c) => c,
                Err(e) => {
                    retry_count += 1;
                    log::error!("❌ 输入打开失败: {}", e);
                    if retry_count >= MAX_RETRIES {
                        bail!(
                            "无法打开视频源 {} (重试{}次), 请检查设备是否被其他程序占用",
                            self.source,
                            MAX_RETRIES
                        );
                    }
                    log::warn!("⚠️ 1秒后重试... ({}/{})", retry_count, MAX_RETRIES);
                    std::thread::sleep(Duration::from_secs(1));
                    continue;
                }
            };

            let sch = match ctx.start() {
                Ok(s) => s,
                Err(e) => bail!("解码启动失败: {}", e),
            };
            log::info!("✅ 视频源连接成功, 开始解码");

            if let Err(e) = sch.wait() {
                // 停止标志置位后由过滤器主动中断, 不视为错误
                if !self.stop.load(Ordering::Relaxed) {
                    log::warn!("⚠️ 解码结束: {}", e);
                }
            }
            log::info!("📹 解码循环结束");
            return Ok(());
        }
    }

    fn input(&self) -> Input {
        match &self.source {
            VideoSource::Camera { index, name } => {
                let url = camera_url(*index, name);
                let input = Input::new(url).set_format(CAMERA_FORMAT);
                match &self.video_size {
                    Some(size) => input
                        .set_input_opts([("video_size", size.as_str())].into()),
                    None => input,
                }
            }
            VideoSource::Url(url) => Input::new(url.as_str()),
        }
    }
}

/// 各平台摄像头输入地址
pub fn camera_url(index: usize, name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("video={}", name)
    } else if cfg!(target_os = "macos") {
        index.to_string()
    } else {
        format!("/dev/video{}", index)
    }
}

/// 可用摄像头列表 (索引, 名称)
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            log::warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_url() {
        let url = camera_url(1, "USB Camera");
        if cfg!(target_os = "windows") {
            assert_eq!(url, "video=USB Camera");
        } else if cfg!(target_os = "macos") {
            assert_eq!(url, "1");
        } else {
            assert_eq!(url, "/dev/video1");
        }
    }
}
