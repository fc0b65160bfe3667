// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 浏览器实时界面 (Live UI)
///
/// - Server: tiny_http 路由与工作线程池
/// - Hub:    最新一帧 JPEG + 统计, MJPEG 推流
pub mod hub;
pub mod server;

pub use hub::{serve_mjpeg, FrameHub};
pub use server::{LiveServer, Route};
