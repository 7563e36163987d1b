// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 模型文件定位与自动下载
//! Resolves the model file, downloading it into the cache directory when missing

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::error::ModelLoadError;

const MAX_MODEL_SIZE: u64 = 2_000_000_000;
const MIN_MODEL_SIZE: u64 = 1024;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// 模型缓存目录: `<cache>/drone-vision/models`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drone-vision")
        .join("models")
}

/// 本地存在直接使用; 否则查缓存; 仍没有且配置了URL则下载
pub fn resolve_model(
    model: &Path,
    url: Option<&str>,
    cache_dir: &Path,
) -> Result<PathBuf, ModelLoadError> {
    if model.is_file() {
        return Ok(model.to_path_buf());
    }

    let file_name = model
        .file_name()
        .ok_or_else(|| ModelLoadError::NotFound(model.display().to_string()))?;
    let cached = cache_dir.join(file_name);
    if cached.is_file() {
        info!("📦 使用缓存模型: {}", cached.display());
        return Ok(cached);
    }

    match url {
        Some(url) => {
            download(url, &cached)?;
            Ok(cached)
        }
        None => Err(ModelLoadError::NotFound(model.display().to_string())),
    }
}

fn download(url: &str, dest: &Path) -> Result<(), ModelLoadError> {
    let fail = |reason: String| ModelLoadError::Download {
        url: url.to_string(),
        reason,
    };

    if !url.starts_with("https://") {
        return Err(fail("only https URLs are allowed".into()));
    }
    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir).map_err(|e| fail(format!("create {}: {}", dir.display(), e)))?;
    }

    info!("⬇️ 下载模型: {} → {}", url, dest.display());
    let response = ureq::get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .call()
        .map_err(|e| fail(e.to_string()))?;

    // 边下载边写临时文件, 完整后再重命名
    let tmp = dest.with_extension("part");
    let size = match stream_to_file(response.into_reader(), &tmp, MAX_MODEL_SIZE) {
        Ok(size) => size,
        Err(reason) => {
            let _ = fs::remove_file(&tmp);
            return Err(fail(reason));
        }
    };
    fs::rename(&tmp, dest).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        fail(e.to_string())
    })?;

    info!("✅ 模型已保存: {} ({} bytes)", dest.display(), size);
    Ok(())
}

/// 复制响应体到文件, 超过 `max_size` 或过小都视为失败
fn stream_to_file(reader: impl Read, path: &Path, max_size: u64) -> Result<u64, String> {
    let mut file =
        fs::File::create(path).map_err(|e| format!("create {}: {}", path.display(), e))?;
    let written = io::copy(&mut reader.take(max_size + 1), &mut file).map_err(|e| e.to_string())?;
    if written > max_size {
        return Err(format!("model larger than {} bytes", max_size));
    }
    if written < MIN_MODEL_SIZE {
        return Err(format!("downloaded file too small ({} bytes)", written));
    }
    file.sync_all().map_err(|e| e.to_string())?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_file_is_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("yolov8n.onnx");
        fs::write(&model, b"onnx").unwrap();

        let resolved = resolve_model(&model, None, &dir.path().join("cache")).unwrap();
        assert_eq!(resolved, model);
    }

    #[test]
    fn test_cached_copy_is_preferred_over_download() {
        let cache = tempfile::tempdir().unwrap();
        fs::write(cache.path().join("yolov8n.onnx"), b"onnx").unwrap();

        let resolved = resolve_model(
            Path::new("missing/yolov8n.onnx"),
            Some("https://invalid.example/yolov8n.onnx"),
            cache.path(),
        )
        .unwrap();
        assert_eq!(resolved, cache.path().join("yolov8n.onnx"));
    }

    #[test]
    fn test_missing_without_url() {
        let cache = tempfile::tempdir().unwrap();
        let err = resolve_model(Path::new("missing/yolov8n.onnx"), None, cache.path());
        assert!(matches!(err, Err(ModelLoadError::NotFound(_))));
    }

    #[test]
    fn test_plain_http_is_refused() {
        let cache = tempfile::tempdir().unwrap();
        let err = resolve_model(
            Path::new("missing/yolov8n.onnx"),
            Some("http://example.com/yolov8n.onnx"),
            cache.path(),
        );
        assert!(matches!(err, Err(ModelLoadError::Download { .. })));
    }

    #[test]
    fn test_stream_to_file_writes_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.part");
        let body = vec![7u8; 4096];

        let written = stream_to_file(io::Cursor::new(body.clone()), &path, 8192).unwrap();

        assert_eq!(written, 4096);
        assert_eq!(fs::read(&path).unwrap(), body);
    }

    #[test]
    fn test_stream_to_file_stops_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.part");

        let err = stream_to_file(io::Cursor::new(vec![0u8; 4096]), &path, 2048).unwrap_err();

        assert!(err.contains("larger than 2048"));
        // 最多只读入 limit + 1 字节
        assert_eq!(fs::metadata(&path).unwrap().len(), 2049);
    }

    #[test]
    fn test_stream_to_file_rejects_tiny_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.part");
        assert!(stream_to_file(io::Cursor::new(b"<html>".to_vec()), &path, 8192).is_err());
    }
}
