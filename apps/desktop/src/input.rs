use std::path::Path;

use anyhow::{bail, Context};
use client_core::ImageUpload;
use shared::protocol::is_image_mime;
use tracing::warn;

/// Reads an image from disk and applies the advisory upload checks: content
/// that is clearly not an image is refused, oversized files only warn.
pub async fn load_upload(path: &Path, max_upload_bytes: u64) -> anyhow::Result<ImageUpload> {
    let mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    check_mime(path, mime_type.as_deref())?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image '{}'", path.display()))?;
    if bytes.is_empty() {
        bail!("'{}' is empty", path.display());
    }
    if exceeds_soft_limit(bytes.len(), max_upload_bytes) {
        warn!(
            "'{}' is {} bytes, above the advised {} byte limit; sending anyway",
            path.display(),
            bytes.len(),
            max_upload_bytes
        );
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ImageUpload::new(file_name, mime_type, bytes))
}

fn check_mime(path: &Path, mime_type: Option<&str>) -> anyhow::Result<()> {
    match mime_type {
        Some(mime_type) if !is_image_mime(mime_type) => {
            bail!("'{}' looks like {mime_type}, not an image", path.display())
        }
        Some(_) => Ok(()),
        None => {
            warn!("cannot tell the type of '{}'; sending it as-is", path.display());
            Ok(())
        }
    }
}

fn exceeds_soft_limit(len: usize, max_upload_bytes: u64) -> bool {
    u64::try_from(len).map_or(true, |len| len > max_upload_bytes)
}
