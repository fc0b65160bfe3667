// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入系统 (Video Input System)
///
/// 独立工作线程, 负责摄像头/视频解码
/// - CameraDecoder: 本地摄像头或视频文件解码器
/// - DecodeFilter:  帧转换 (RGB24/YUV420P → RgbImage) 与投递
pub mod camera;
pub mod decode_filter;

use std::fmt;

use image::RgbImage;

pub use camera::{get_camera_devices, CameraDecoder};
pub use decode_filter::DecodeFilter;

/// 解码得到的一帧
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub image: RgbImage,
    pub frame_id: u64,
    pub decode_fps: f64,
}

/// 视频来源
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoSource {
    Camera { index: usize, name: String },
    Url(String),
}

impl VideoSource {
    /// 按索引选择摄像头, 设备名称从系统设备列表中查找
    pub fn camera(index: usize) -> Self {
        let name = get_camera_devices()
            .into_iter()
            .find(|(i, _)| *i == index)
            .map(|(_, name)| name)
            .unwrap_or_default();
        Self::Camera { index, name }
    }

    /// 纯数字视为摄像头索引, 其余视为文件路径或流地址
    pub fn parse(s: &str) -> Self {
        match s.trim().parse::<usize>() {
            Ok(index) => Self::camera(index),
            Err(_) => Self::Url(s.to_string()),
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera { index, name } if name.is_empty() => write!(f, "camera #{}", index),
            Self::Camera { index, name } => write!(f, "camera #{} ({})", index, name),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        assert_eq!(
            VideoSource::parse("rtsp://127.0.0.1/live"),
            VideoSource::Url("rtsp://127.0.0.1/live".to_string())
        );
        assert_eq!(
            VideoSource::parse("clip.mp4"),
            VideoSource::Url("clip.mp4".to_string())
        );
    }

    #[test]
    fn test_display() {
        let cam = VideoSource::Camera {
            index: 0,
            name: "FaceTime HD".to_string(),
        };
        assert_eq!(cam.to_string(), "camera #0 (FaceTime HD)");
        let cam = VideoSource::Camera {
            index: 2,
            name: String::new(),
        };
        assert_eq!(cam.to_string(), "camera #2");
    }
}
