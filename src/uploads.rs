//! Image upload validation and local disk storage.

use std::path::{Path, PathBuf};

use crate::config::StorageConfig;

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub path: PathBuf,
    /// Public URL under the `/uploads` static mount.
    pub url: String,
    pub content_type: String,
}

/// Resolve the effective content type of an uploaded part: the declared
/// type if present, otherwise a guess from the file name.
pub fn content_type_of(declared: Option<&str>, file_name: Option<&str>) -> Option<String> {
    declared
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .or_else(|| {
            file_name
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string)
        })
}

/// Enforce the size cap and MIME allow-list. Returns the accepted type.
pub fn validate<'a>(
    content_type: Option<&'a str>,
    len: usize,
    config: &StorageConfig,
) -> Result<&'a str, String> {
    let content_type = content_type.ok_or_else(|| "Unknown file type".to_string())?;
    if !config.allowed_types.iter().any(|t| t == content_type) {
        return Err(format!(
            "File type {content_type} is not allowed. Allowed: {}",
            config.allowed_types.join(", ")
        ));
    }
    if len == 0 {
        return Err("File is empty".into());
    }
    if len > config.max_upload_bytes {
        return Err(format!(
            "File exceeds the {} MB limit",
            config.max_upload_bytes / (1024 * 1024)
        ));
    }
    Ok(content_type)
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}

/// Write bytes under `<root>/<subdir>/<id>.<ext>`.
pub async fn store(
    root: &Path,
    subdir: &str,
    bytes: &[u8],
    content_type: &str,
) -> std::io::Result<StoredFile> {
    let id = crate::db::new_id();
    let file_name = format!("{}.{}", id, extension_for(content_type));
    let dir = root.join(subdir);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(&file_name);
    tokio::fs::write(&path, bytes).await?;

    Ok(StoredFile {
        id,
        path,
        url: format!("/uploads/{}/{}", subdir.trim_matches('/'), file_name),
        content_type: content_type.to_string(),
    })
}

/// Remove a stored file. A file that is already gone is not an error.
pub async fn remove(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Directory holding a listing's images.
pub fn listing_dir(root: &Path, listing_id: &str) -> PathBuf {
    root.join("listings").join(listing_id)
}

/// Drop a deleted listing's image directory. Failures are logged only.
pub async fn remove_listing_dir(root: &Path, listing_id: &str) {
    let dir = listing_dir(root, listing_id);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", dir.display(), e),
    }
}
