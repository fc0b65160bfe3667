// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 模型下载: `--model` 为 http(s) 地址时下载到缓存目录, 已存在则直接复用

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 返回可直接加载的本地模型路径
pub fn resolve_model(model: &str) -> Result<String> {
    if !is_url(model) {
        if !Path::new(model).exists() {
            bail!("模型文件不存在: {}", model);
        }
        return Ok(model.to_string());
    }

    let path = cache_path(model)?;
    if path.exists() {
        log::info!("📦 使用缓存模型: {}", path.display());
        return Ok(path.to_string_lossy().into_owned());
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("创建缓存目录失败: {}", dir.display()))?;
    }

    log::info!("⬇️ 下载模型: {} → {}", model, path.display());
    let resp = ureq::get(model)
        .call()
        .map_err(|e| anyhow!("下载模型失败: {}", e))?;

    // 先写临时文件, 完成后再重命名, 避免中断留下半个模型
    let tmp = path.with_extension("part");
    let mut file = fs::File::create(&tmp)?;
    io::copy(&mut resp.into_reader(), &mut file).context("写入模型文件失败")?;
    fs::rename(&tmp, &path)?;

    Ok(path.to_string_lossy().into_owned())
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn cache_path(url: &str) -> Result<PathBuf> {
    let name = url
        .split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| anyhow!("无法从地址解析文件名: {}", url))?;

    let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    Ok(base.join("cmm-vision").join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_path_strips_query() {
        let p = cache_path("https://example.com/models/CMM-Yolo11.onnx?dl=1").unwrap();
        assert!(p.ends_with("cmm-vision/CMM-Yolo11.onnx"));
    }

    #[test]
    fn test_cache_path_rejects_trailing_slash() {
        assert!(cache_path("https://example.com/models/").is_err());
    }

    #[test]
    fn test_missing_local_model() {
        let err = resolve_model("does/not/exist.onnx").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.onnx"));
    }
}
