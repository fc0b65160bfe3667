// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// - Detector: 逐帧检测与叠加
/// - Filter:   目标类别过滤
/// - Merch:    logo-宿主包含关系计数
pub mod detector;
pub mod filter;
pub mod merch;
pub mod types;

pub use detector::{FrameDetector, FrameStats, ProcessedFrame};
pub use merch::{find_merch, logo_inside, pad_box, MerchClasses};
