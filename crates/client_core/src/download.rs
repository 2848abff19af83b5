use std::path::{Path, PathBuf};

use shared::protocol::DEFAULT_DOWNLOAD_NAME;
use thiserror::Error;
use tracing::info;

use crate::image_store::{ImageKey, StoredImage};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("image {0} is no longer held by the session")]
    Released(ImageKey),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves where a download lands. Existing directories get the default
/// download file name appended.
pub async fn resolve_destination(destination: &Path) -> PathBuf {
    match tokio::fs::metadata(destination).await {
        Ok(metadata) if metadata.is_dir() => destination.join(DEFAULT_DOWNLOAD_NAME),
        _ => destination.to_path_buf(),
    }
}

pub async fn save_image(image: &StoredImage, destination: &Path) -> Result<PathBuf, DownloadError> {
    let path = resolve_destination(destination).await;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| DownloadError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(&path, &image.bytes[..])
        .await
        .map_err(|source| DownloadError::Io {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), bytes = image.len(), "image saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_store::ImageStore;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("colorizer-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[tokio::test]
    async fn directory_destination_uses_default_name() {
        let dir = scratch_dir("download-dir");
        let store = ImageStore::new();
        let reference = store.insert(b"jpeg-bytes".to_vec(), Some("image/jpeg".into()));
        let image = store.read(&reference).expect("image held");

        let path = save_image(&image, &dir).await.expect("save");
        assert_eq!(path, dir.join(DEFAULT_DOWNLOAD_NAME));
        assert_eq!(std::fs::read(&path).expect("read back"), b"jpeg-bytes");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_destination_creates_missing_parents() {
        let dir = scratch_dir("download-file");
        let target = dir.join("nested").join("out.jpg");
        let store = ImageStore::new();
        let reference = store.insert(b"abc".to_vec(), None);
        let image = store.read(&reference).expect("image held");

        let path = save_image(&image, &target).await.expect("save");
        assert_eq!(path, target);
        assert_eq!(std::fs::read(&target).expect("read back"), b"abc");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
