// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 桌面显示 (Display)
///
/// - Window: macroquad 窗口, 显示最新一帧已标注画面
pub mod window;

pub use window::{window_conf, FrameWindow};
