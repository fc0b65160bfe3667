// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统数据结构定义
/// Data structures for the detection system
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Bbox {
    // a bounding box around an object
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32, id: usize, confidence: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1, id, confidence)
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn cxcy(&self) -> (f32, f32) {
        (self.xmin + self.width / 2., self.ymin + self.height / 2.)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }

    /// 整数像素角点, 向零截断
    pub fn to_pixel_rect(&self) -> PixelRect {
        PixelRect::new(
            self.xmin() as i32,
            self.ymin() as i32,
            self.xmax() as i32,
            self.ymax() as i32,
        )
    }
}

/// 整数像素坐标的矩形 (x1, y1, x2, y2), 边界包含在内
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct PixelRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// 整数中心点 (向下取整)
    pub fn center(&self) -> (i32, i32) {
        (
            (self.x1 + self.x2).div_euclid(2),
            (self.y1 + self.y2).div_euclid(2),
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }
}

/// 带类别名称的检测结果 (单帧)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub name: String,
    pub bbox: Bbox,
}

impl Detection {
    pub fn new(name: impl Into<String>, bbox: Bbox) -> Self {
        Self {
            name: name.into(),
            bbox,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.bbox.confidence()
    }

    pub fn rect(&self) -> PixelRect {
        self.bbox.to_pixel_rect()
    }

    /// 标签文本, 例如 `cup 0.87`
    pub fn label(&self, upper: bool) -> String {
        let name = if upper {
            self.name.to_uppercase()
        } else {
            self.name.clone()
        };
        format!("{} {:.2}", name, self.confidence())
    }
}

/// 模型输出的单张图片检测结果 (仅检测任务)
#[derive(Clone, PartialEq, Default, Debug)]
pub struct DetectionResult {
    pub bboxes: Vec<Bbox>,
}

impl DetectionResult {
    pub fn new(bboxes: Vec<Bbox>) -> Self {
        Self { bboxes }
    }

    pub fn bboxes(&self) -> &[Bbox] {
        &self.bboxes
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }

    /// 按类别名称展开
    pub fn labeled(&self, names: &[String]) -> Vec<Detection> {
        self.bboxes
            .iter()
            .map(|b| {
                let name = names
                    .get(b.id())
                    .cloned()
                    .unwrap_or_else(|| format!("class{}", b.id()));
                Detection::new(name, b.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_iou() {
        let a = Bbox::from_xyxy(0., 0., 10., 10., 0, 0.9);
        let b = Bbox::from_xyxy(5., 0., 15., 10., 0, 0.8);
        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-6);
        assert_eq!(a.iou(&a), 1.0);

        let far = Bbox::from_xyxy(100., 100., 110., 110., 0, 0.5);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_degenerate_iou_is_zero() {
        let a = Bbox::from_xyxy(3., 3., 3., 3., 0, 0.9);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn test_pixel_rect_truncates() {
        let b = Bbox::from_xyxy(10.9, 20.2, 30.7, 40.99, 1, 0.5);
        assert_eq!(b.to_pixel_rect(), PixelRect::new(10, 20, 30, 40));
    }

    #[test]
    fn test_center_floors() {
        assert_eq!(PixelRect::new(0, 0, 5, 5).center(), (2, 2));
        assert_eq!(PixelRect::new(-5, -5, 0, 0).center(), (-3, -3));
    }

    #[test]
    fn test_labeled_unknown_class() {
        let result = DetectionResult::new(vec![
            Bbox::from_xyxy(0., 0., 1., 1., 0, 0.5),
            Bbox::from_xyxy(0., 0., 1., 1., 7, 0.5),
        ]);
        let names = vec!["cup".to_string()];
        let dets = result.labeled(&names);
        assert_eq!(dets[0].name, "cup");
        assert_eq!(dets[1].name, "class7");
        assert_eq!(dets[0].label(true), "CUP 0.50");
    }
}
