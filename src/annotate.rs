// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测结果叠加绘制 (检测框 / 标签 / 周边商品框 / 计数)

use std::path::PathBuf;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detector_config::{DetectorConfig, LabelStyle};
use crate::{Detection, PixelRect};

const LABEL_PX: f32 = 16.0;
const LARGE_PX: f32 = 26.0;
const COUNT_PX: f32 = 32.0;
const BANNER_HEIGHT: i32 = 20;
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const FONT_FILES: &[&str] = &["DejaVuSans.ttf", "Arial.ttf", "arial.ttf", "msyh.ttc"];
const FONT_DIRS: &[&str] = &[
    "assets/font",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/TTF",
    "/usr/share/fonts/dejavu",
    "/System/Library/Fonts/Supplemental",
    "/Library/Fonts",
    "C:\\Windows\\Fonts",
];

pub struct Annotator {
    font: Option<FontVec>,
    style: LabelStyle,
    box_color: Rgb<u8>,
    merch_color: Rgb<u8>,
    merch_label: String,
}

impl Annotator {
    pub fn new(config: &DetectorConfig) -> Self {
        let font = load_font(config.font_path.as_deref());
        if font.is_none() {
            log::warn!("⚠️ 未找到可用字体, 仅绘制检测框 (可在配置中设置 font_path)");
        }
        Self::with_font(config, font)
    }

    pub fn with_font(config: &DetectorConfig, font: Option<FontVec>) -> Self {
        Self {
            font,
            style: config.label_style,
            box_color: Rgb(config.box_color),
            merch_color: Rgb(config.merch_color),
            merch_label: config.merch_label.clone(),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 检测框 + 标签
    pub fn draw_detections(&self, img: &mut RgbImage, detections: &[Detection]) {
        for det in detections {
            let r = det.rect();
            draw_box(img, &r, self.box_color, 2);
            match self.style {
                LabelStyle::Banner => {
                    let label = det.label(true);
                    let tw = self.text_width(&label, LABEL_PX);
                    if tw > 0 {
                        draw_filled_rect_mut(
                            img,
                            Rect::at(r.x1, r.y1 - BANNER_HEIGHT).of_size(tw, BANNER_HEIGHT as u32),
                            self.box_color,
                        );
                    }
                    self.put_text(img, &label, r.x1, r.y1 - 5, LABEL_PX, TEXT_COLOR);
                }
                LabelStyle::Plain => {
                    let label = det.label(false);
                    self.put_text(img, &label, r.x1, r.y1 - 10, LARGE_PX, self.box_color);
                }
            }
        }
    }

    /// 周边商品框 (已外扩)
    pub fn draw_merch(&self, img: &mut RgbImage, boxes: &[PixelRect]) {
        for r in boxes {
            draw_box(img, r, self.merch_color, 3);
            self.put_text(
                img,
                &self.merch_label,
                r.x1,
                r.y1 - 10,
                LARGE_PX,
                self.merch_color,
            );
        }
    }

    /// 左上角计数
    pub fn draw_count(&self, img: &mut RgbImage, count: usize) {
        let text = format!("{} COUNT: {}", self.merch_label, count);
        self.put_text(img, &text, 10, 35, COUNT_PX, self.merch_color);
    }

    fn text_width(&self, text: &str, px: f32) -> u32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(px), font, text).0,
            None => 0,
        }
    }

    /// `baseline` 为文字基线 y 坐标
    fn put_text(&self, img: &mut RgbImage, text: &str, x: i32, baseline: i32, px: f32, color: Rgb<u8>) {
        let Some(font) = &self.font else { return };
        let scale = PxScale::from(px);
        let (_, th) = text_size(scale, font, text);
        draw_text_mut(img, color, x, baseline - th as i32, scale, font, text);
    }
}

/// 画指定线宽的空心矩形, 越界部分自动裁剪
pub fn draw_box(img: &mut RgbImage, r: &PixelRect, color: Rgb<u8>, thickness: u32) {
    let thickness = thickness.max(1) as i32;
    for t in 0..thickness {
        let o = t - (thickness - 1) / 2;
        let (x1, y1, x2, y2) = (r.x1 - o, r.y1 - o, r.x2 + o, r.y2 + o);
        if x2 < x1 || y2 < y1 {
            continue;
        }
        let rect = Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

fn font_candidates(explicit: Option<&str>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = explicit.map(PathBuf::from).into_iter().collect();
    let mut dirs: Vec<PathBuf> = FONT_DIRS.iter().map(PathBuf::from).collect();
    if let Some(dir) = dirs::font_dir() {
        dirs.insert(1, dir);
    }
    for dir in dirs {
        for file in FONT_FILES {
            paths.push(dir.join(file));
        }
    }
    paths
}

fn load_font(explicit: Option<&str>) -> Option<FontVec> {
    for path in font_candidates(explicit) {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                log::info!("✅ 字体加载成功: {}", path.display());
                return Some(font);
            }
            Err(e) => log::warn!("⚠️ 字体解析失败 {}: {}", path.display(), e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bbox;

    fn blank() -> RgbImage {
        RgbImage::new(100, 80)
    }

    #[test]
    fn test_draw_box_thickness() {
        let mut img = blank();
        draw_box(&mut img, &PixelRect::new(10, 10, 50, 40), Rgb([0, 255, 0]), 2);
        assert_eq!(img.get_pixel(9, 20), &Rgb([0, 255, 0]));
        assert_eq!(img.get_pixel(10, 20), &Rgb([0, 255, 0]));
        assert_eq!(img.get_pixel(11, 20), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(30, 25), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_box_clips_outside_frame() {
        let mut img = blank();
        draw_box(&mut img, &PixelRect::new(-20, -20, 200, 200), Rgb([255, 0, 255]), 3);
        draw_box(&mut img, &PixelRect::new(90, 70, 99, 79), Rgb([255, 0, 255]), 3);
        assert_eq!(img.get_pixel(99, 79), &Rgb([255, 0, 255]));
    }

    #[test]
    fn test_annotate_without_font_draws_boxes() {
        let annotator = Annotator::with_font(&DetectorConfig::live(), None);
        assert!(!annotator.has_font());

        let mut img = blank();
        let dets = vec![Detection::new(
            "UNCC TORSO",
            Bbox::from_xyxy(5., 5., 60., 60., 1, 0.8),
        )];
        annotator.draw_detections(&mut img, &dets);
        annotator.draw_merch(&mut img, &[PixelRect::new(20, 20, 40, 40)]);
        annotator.draw_count(&mut img, 1);

        assert_eq!(img.get_pixel(5, 30), &Rgb([0, 255, 0]));
        assert_eq!(img.get_pixel(20, 30), &Rgb([255, 0, 255]));
        // 无字体时不绘制标签底色
        assert_eq!(img.get_pixel(6, 1), &Rgb([0, 0, 0]));
    }

    fn bundled_font() -> FontVec {
        let bytes = include_bytes!("../assets/font/DejaVuSans.ttf");
        FontVec::try_from_vec(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_banner_labels_and_count_with_font() {
        let annotator = Annotator::with_font(&DetectorConfig::live(), Some(bundled_font()));
        assert!(annotator.has_font());

        let mut img = RgbImage::new(400, 120);
        // 标签完全越过上边界
        let top = Detection::new("UNCC-LOGO", Bbox::from_xyxy(200., 0., 260., 50., 0, 0.9));
        let det = Detection::new("UNCC TORSO", Bbox::from_xyxy(20., 40., 180., 110., 1, 0.8));
        annotator.draw_detections(&mut img, &[top, det.clone()]);

        // 底色在框上方 20 像素内, 黑色文字压在底色上
        let tw = annotator.text_width(&det.label(true), LABEL_PX) as i32;
        assert!(tw > 0);
        let (mut green, mut dark) = (0, 0);
        for y in 22..38u32 {
            for x in 22..(20 + tw - 1) as u32 {
                let p = img.get_pixel(x, y).0;
                if p == [0, 255, 0] {
                    green += 1;
                } else if p[1] < 128 {
                    dark += 1;
                }
            }
        }
        assert!(green > 0 && dark > 0, "green={} dark={}", green, dark);

        annotator.draw_count(&mut img, 3);
        let magenta = (10..300u32)
            .flat_map(|x| (0..40u32).map(move |y| (x, y)))
            .filter(|&(x, y)| {
                let [r, g, b] = img.get_pixel(x, y).0;
                r > 128 && b > 128 && g < 64
            })
            .count();
        assert!(magenta > 0);
    }

    #[test]
    fn test_font_candidates_explicit_first() {
        let paths = font_candidates(Some("my.ttf"));
        assert_eq!(paths[0], PathBuf::from("my.ttf"));
        assert!(paths.len() > FONT_FILES.len());
    }
}
