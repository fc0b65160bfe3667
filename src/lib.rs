#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 检测结果叠加绘制
pub mod config; // 命令行模型参数
pub mod detection; // 检测系统 (逐帧流程 + 周边商品计数)
pub mod detector_config; // JSON 检测配置
pub mod display; // 桌面窗口显示
pub mod download; // 模型下载与缓存
pub mod input; // 视频输入系统
pub mod live; // 浏览器实时界面
pub mod models; // 模型接口与具体实现
pub mod ort_backend;

pub use crate::config::ModelArgs;
pub use crate::detection::types::{Bbox, Detection, DetectionResult, PixelRect};
pub use crate::detector_config::DetectorConfig;
pub use crate::models::{Model, ModelInfo, Yolo};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

/// 按类别的贪心 NMS (同 Ultralytics 默认 agnostic=False)
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| {
        b2.confidence()
            .partial_cmp(&b1.confidence())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].id() != xs[index].id() {
                continue;
            }
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 本地时间字符串, 用于输出文件命名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%3f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// 初始化日志, 默认 info 级别, `RUST_LOG` 可覆盖
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_per_class() {
        let mut xs = vec![
            Bbox::from_xyxy(0., 0., 10., 10., 0, 0.6),
            Bbox::from_xyxy(1., 1., 10., 10., 0, 0.9),
            Bbox::from_xyxy(0., 0., 10., 10., 1, 0.5),
            Bbox::from_xyxy(50., 50., 60., 60., 0, 0.4),
        ];
        non_max_suppression(&mut xs, 0.45);

        assert_eq!(xs.len(), 3);
        assert_eq!(xs[0].confidence(), 0.9);
        assert_eq!(xs[1].id(), 1);
        assert_eq!(xs[2].confidence(), 0.4);
    }

    #[test]
    fn test_nms_nan_does_not_panic() {
        let mut xs = vec![
            Bbox::from_xyxy(0., 0., 10., 10., 0, f32::NAN),
            Bbox::from_xyxy(20., 20., 30., 30., 0, 0.5),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
    }

    #[test]
    fn test_gen_time_string() {
        let s = gen_time_string("-");
        assert_eq!(s.split('-').count(), 7);
    }
}
