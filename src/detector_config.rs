// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测配置 - 通过JSON文件调整参数

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;

use crate::detection::merch::MerchClasses;

/// 标签样式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    /// 框上方绿色文字 `label 0.87`
    Plain,
    /// 填充底色 + 黑色大写文字 `LABEL 0.87`
    Banner,
}

/// 检测与叠加参数配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // === 预处理 ===
    pub mirror: bool,      // 水平镜像 (自拍视角)
    pub target_width: u32, // 推理前缩放的最大宽度

    // === 过滤 ===
    pub target_classes: Vec<String>, // 只显示这些类别, 空表示全部

    // === 周边商品计数 ===
    pub merch_enabled: bool,
    pub merch_classes: MerchClasses,
    pub merch_padding: f32, // 宿主框外扩比例
    pub merch_label: String,

    // === 叠加样式 ===
    pub label_style: LabelStyle,
    pub box_color: [u8; 3],
    pub merch_color: [u8; 3],
    pub font_path: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            mirror: false,
            target_width: 640,
            target_classes: Vec::new(),
            merch_enabled: false,
            merch_classes: MerchClasses::default(),
            merch_padding: 0.15,
            merch_label: "UNCC MERCH".to_string(),
            label_style: LabelStyle::Plain,
            box_color: [0, 255, 0],
            merch_color: [255, 0, 255],
            font_path: None,
        }
    }
}

impl DetectorConfig {
    /// 浏览器界面默认配置: 镜像 + 周边商品计数
    pub fn live() -> Self {
        Self {
            mirror: true,
            merch_enabled: true,
            label_style: LabelStyle::Banner,
            ..Self::default()
        }
    }

    /// 从JSON文件加载配置, 文件不存在时以 `defaults` 创建
    ///
    /// 文件中缺省的字段取自 `defaults`, 而不是 `DetectorConfig::default()`。
    pub fn load(path: &str, defaults: Self) -> Self {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("📝 配置文件不存在,创建默认配置...");
                defaults.save(path);
                return defaults;
            }
            Err(e) => {
                log::warn!("⚠️ 无法读取配置文件 {}: {}, 使用默认值 (文件保持不变)", path, e);
                return defaults;
            }
        };

        match Self::merge_json(&json, &defaults) {
            Ok(config) => {
                log::info!("✅ 配置已从 {} 加载", path);
                config
            }
            Err(e) => {
                log::warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                defaults
            }
        }
    }

    /// 把 JSON 覆盖到 `defaults` 之上
    fn merge_json(json: &str, defaults: &Self) -> serde_json::Result<Self> {
        let overlay: Value = serde_json::from_str(json)?;
        let mut base = serde_json::to_value(defaults)?;
        merge_value(&mut base, overlay);
        serde_json::from_value(base)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &str) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log::error!("❌ 保存配置失败: {}", e);
                } else {
                    log::info!("💾 配置已保存到 {}", path);
                }
            }
            Err(e) => log::error!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        log::info!("🎛️ 当前检测配置:");
        log::info!("  镜像: {} | 推理宽度: {}", self.mirror, self.target_width);
        if !self.target_classes.is_empty() {
            log::info!("  目标类别: {:?}", self.target_classes);
        }
        if self.merch_enabled {
            log::info!(
                "  周边计数: logo={} torso={} headgear={} 外扩={:.2}",
                self.merch_classes.logo,
                self.merch_classes.torso,
                self.merch_classes.headgear,
                self.merch_padding
            );
        }
    }
}

/// 对象逐字段递归覆盖, 其余类型整体替换
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("cmm-vision-{}-{}.json", name, std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_load_creates_missing_file() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);

        let config = DetectorConfig::load(&path, DetectorConfig::live());
        assert!(config.mirror);
        assert!(config.merch_enabled);
        assert!(fs::metadata(&path).is_ok());

        let reloaded = DetectorConfig::load(&path, DetectorConfig::default());
        assert!(reloaded.merch_enabled);
        assert_eq!(reloaded.label_style, LabelStyle::Banner);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let path = temp_path("partial");
        fs::write(&path, r#"{"target_classes": ["cup"], "label_style": "banner"}"#).unwrap();

        let config = DetectorConfig::load(&path, DetectorConfig::default());
        assert_eq!(config.target_classes, ["cup"]);
        assert_eq!(config.label_style, LabelStyle::Banner);
        assert_eq!(config.target_width, 640);
        assert_eq!(config.merch_classes.logo, "UNCC-LOGO");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let path = temp_path("invalid");
        fs::write(&path, "{ not json").unwrap();

        let config = DetectorConfig::load(&path, DetectorConfig::live());
        assert!(config.mirror);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_partial_json_keeps_caller_defaults() {
        let path = temp_path("partial-live");
        fs::write(&path, r#"{"merch_padding": 0.2, "merch_classes": {"logo": "CMM-LOGO"}}"#).unwrap();

        let config = DetectorConfig::load(&path, DetectorConfig::live());
        assert!(config.mirror);
        assert!(config.merch_enabled);
        assert_eq!(config.label_style, LabelStyle::Banner);
        assert!((config.merch_padding - 0.2).abs() < 1e-6);
        assert_eq!(config.merch_classes.logo, "CMM-LOGO");
        assert_eq!(config.merch_classes.torso, "UNCC TORSO");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_unreadable_file_is_not_overwritten() {
        let path = temp_path("non-utf8");
        let bytes = b"{\"merch_label\": \"\xc9\xcc\xc6\xb7\"}".to_vec();
        fs::write(&path, &bytes).unwrap();

        let config = DetectorConfig::load(&path, DetectorConfig::live());
        assert!(config.merch_enabled);
        assert_eq!(config.merch_label, "UNCC MERCH");
        assert_eq!(fs::read(&path).unwrap(), bytes);
        let _ = fs::remove_file(&path);
    }
}
