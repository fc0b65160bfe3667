// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 周边商品计数 (Merch counting)
//!
//! 一个 logo 框的中心点落在上衣(torso)或帽子(headgear)框内, 即计为一件周边商品。

use serde::{Deserialize, Serialize};

use super::types::{Detection, PixelRect};

/// logo 中心点是否落在宿主框内 (含边界)
pub fn logo_inside(logo: &PixelRect, host: &PixelRect) -> bool {
    let (cx, cy) = logo.center();
    host.contains(cx, cy)
}

/// 参与计数的类别名称 (大小写不敏感)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchClasses {
    pub logo: String,
    pub torso: String,
    pub headgear: String,
}

impl Default for MerchClasses {
    fn default() -> Self {
        Self {
            logo: "UNCC-LOGO".to_string(),
            torso: "UNCC TORSO".to_string(),
            headgear: "UNCC HEADGEAR".to_string(),
        }
    }
}

impl MerchClasses {
    fn is(name: &str, class: &str) -> bool {
        name.to_uppercase() == class.to_uppercase()
    }
}

/// 找出所有含 logo 的宿主框
///
/// 每个 (logo, 宿主) 匹配对记录一次宿主框, 因此返回长度即计数。
/// 宿主顺序: 先 torso 后 headgear。
pub fn find_merch(detections: &[Detection], classes: &MerchClasses) -> Vec<PixelRect> {
    let mut logos = Vec::new();
    let mut torsos = Vec::new();
    let mut headgears = Vec::new();

    for det in detections {
        if MerchClasses::is(&det.name, &classes.logo) {
            logos.push(det.rect());
        } else if MerchClasses::is(&det.name, &classes.torso) {
            torsos.push(det.rect());
        } else if MerchClasses::is(&det.name, &classes.headgear) {
            headgears.push(det.rect());
        }
    }

    let mut merch = Vec::new();
    for logo in &logos {
        for host in torsos.iter().chain(headgears.iter()) {
            if logo_inside(logo, host) {
                merch.push(*host);
            }
        }
    }
    merch
}

/// 按比例向外扩展并裁剪到画面范围
pub fn pad_box(rect: &PixelRect, ratio: f32, frame_w: u32, frame_h: u32) -> PixelRect {
    let pad_x = (rect.width() as f32 * ratio) as i32;
    let pad_y = (rect.height() as f32 * ratio) as i32;

    PixelRect::new(
        (rect.x1 - pad_x).max(0),
        (rect.y1 - pad_y).max(0),
        (rect.x2 + pad_x).min(frame_w as i32),
        (rect.y2 + pad_y).min(frame_h as i32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::Bbox;

    fn det(name: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(name, Bbox::from_xyxy(x1, y1, x2, y2, 0, 0.9))
    }

    #[test]
    fn test_logo_inside_edges() {
        let host = PixelRect::new(0, 0, 100, 100);
        assert!(logo_inside(&PixelRect::new(90, 90, 110, 110), &host));
        assert!(logo_inside(&PixelRect::new(98, 0, 102, 4), &host));
        assert!(!logo_inside(&PixelRect::new(99, 0, 103, 4), &host));
    }

    #[test]
    fn test_find_merch_counts_pairs() {
        let dets = vec![
            det("UNCC TORSO", 0., 0., 200., 300.),
            det("uncc-logo", 80., 100., 120., 140.),
            det("UNCC-LOGO", 50., 200., 70., 220.),
            det("UNCC HEADGEAR", 500., 0., 600., 80.),
            det("person", 0., 0., 640., 480.),
        ];
        let merch = find_merch(&dets, &MerchClasses::default());
        assert_eq!(merch.len(), 2);
        assert!(merch.iter().all(|r| *r == PixelRect::new(0, 0, 200, 300)));
    }

    #[test]
    fn test_find_merch_headgear_after_torso() {
        let dets = vec![
            det("UNCC HEADGEAR", 0., 0., 100., 100.),
            det("UNCC TORSO", 0., 0., 200., 200.),
            det("UNCC-LOGO", 40., 40., 60., 60.),
        ];
        let merch = find_merch(&dets, &MerchClasses::default());
        assert_eq!(
            merch,
            vec![PixelRect::new(0, 0, 200, 200), PixelRect::new(0, 0, 100, 100)]
        );
    }

    #[test]
    fn test_find_merch_without_logo() {
        let dets = vec![det("UNCC TORSO", 0., 0., 200., 300.)];
        assert!(find_merch(&dets, &MerchClasses::default()).is_empty());
    }

    #[test]
    fn test_pad_box_clamps() {
        let padded = pad_box(&PixelRect::new(10, 10, 110, 210), 0.15, 120, 220);
        assert_eq!(padded, PixelRect::new(0, 0, 120, 220));

        let inner = pad_box(&PixelRect::new(100, 100, 200, 200), 0.15, 640, 480);
        assert_eq!(inner, PixelRect::new(85, 85, 215, 215));
    }
}
