// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
use super::types::Detection;

/// 只保留目标类别, 例如 `["cup"]`; 空列表表示不过滤
pub fn retain_classes(detections: &mut Vec<Detection>, targets: &[String]) {
    if targets.is_empty() {
        return;
    }
    detections.retain(|d| targets.iter().any(|t| t == &d.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::Bbox;

    #[test]
    fn test_retain_classes() {
        let mut dets = vec![
            Detection::new("cup", Bbox::default()),
            Detection::new("book", Bbox::default()),
            Detection::new("laptop", Bbox::default()),
        ];
        retain_classes(&mut dets, &["cup".to_string(), "laptop".to_string()]);
        let names: Vec<_> = dets.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["cup", "laptop"]);

        retain_classes(&mut dets, &[]);
        assert_eq!(dets.len(), 2);
    }
}
