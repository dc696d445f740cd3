//! Input resolution: read a local path or download a URL into memory.
//!
//! The extraction pipeline works on byte buffers, so unlike a path-based
//! renderer nothing needs to touch disk here. Upload-style admission checks
//! happen before any decoding: the file name's extension must be on the
//! allow-list and the payload must fit under `max_file_size`. Content is
//! sniffed later (`%PDF` signature), so the extension is a gate, not a type.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bytes plus the name they were admitted under.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (path or URL) and apply the extension and size checks.
pub async fn load_input(input: &str, config: &ExtractionConfig) -> Result<LoadedInput, ExtractError> {
    let loaded = if is_url(input) {
        download_url(input, config).await?
    } else {
        read_local(input, config).await?
    };
    debug!("Loaded '{}' ({} bytes)", loaded.name, loaded.bytes.len());
    Ok(loaded)
}

/// Reject names whose extension is not in `allowed` (case-insensitive).
pub fn check_extension(name: &str, allowed: &[String]) -> Result<(), ExtractError> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext {
        Some(ext) if allowed.iter().any(|a| *a == ext) => Ok(()),
        _ => Err(ExtractError::UnsupportedFileType {
            name: name.to_string(),
        }),
    }
}

pub fn check_size(size: u64, limit: u64) -> Result<(), ExtractError> {
    if size > limit {
        Err(ExtractError::FileTooLarge { size, limit })
    } else {
        Ok(())
    }
}

async fn read_local(path_str: &str, config: &ExtractionConfig) -> Result<LoadedInput, ExtractError> {
    let path = PathBuf::from(path_str);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    check_extension(&name, &config.allowed_extensions)?;

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ExtractError::FileNotFound { path: path.clone() })?;
    if !meta.is_file() {
        return Err(ExtractError::FileNotFound { path });
    }
    check_size(meta.len(), config.max_file_size)?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ExtractError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;

    Ok(LoadedInput { name, bytes })
}

async fn download_url(url: &str, config: &ExtractionConfig) -> Result<LoadedInput, ExtractError> {
    info!("Downloading document from: {}", url);
    let timeout_secs = config.download_timeout_secs;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;
    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    // Extension-less URLs (signed links, CDN handles) skip the gate; the
    // content is sniffed downstream anyway.
    let name = match filename_from_url(url) {
        Some(name) => {
            check_extension(&name, &config.allowed_extensions)?;
            name
        }
        None => {
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            format!("download.{}", extension_for_content_type(content_type))
        }
    };

    if let Some(len) = response.content_length() {
        check_size(len, config.max_file_size)?;
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    check_size(bytes.len() as u64, config.max_file_size)?;

    Ok(LoadedInput {
        name,
        bytes: bytes.to_vec(),
    })
}

/// Last URL path segment, when it looks like a file name.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

fn extension_for_content_type(content_type: &str) -> &'static str {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    match mime {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        _ => "bin",
    }
}
