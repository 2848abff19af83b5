//! Currently selected source image.

use std::sync::Arc;

use shared::protocol::DEFAULT_UPLOAD_NAME;

use crate::image_store::{DisplayRef, ImageStore};

/// A file handed to the session by the presentation layer. Size and type limits
/// are advisory and checked, if at all, before this value is built.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let file_name = if file_name.trim().is_empty() {
            DEFAULT_UPLOAD_NAME.to_string()
        } else {
            file_name
        };
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceImage {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Arc<[u8]>,
    pub preview: DisplayRef,
}

#[derive(Debug, Default)]
pub struct AssetHolder {
    current: Option<SourceImage>,
}

impl AssetHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the selection. Returns the new preview together with the
    /// previous selection; dropping the latter releases its preview reference.
    pub fn select(
        &mut self,
        store: &ImageStore,
        upload: ImageUpload,
    ) -> (DisplayRef, Option<SourceImage>) {
        let bytes: Arc<[u8]> = upload.bytes.into();
        let preview = store.insert(Arc::clone(&bytes), upload.mime_type.clone());
        let previous = self.current.replace(SourceImage {
            file_name: upload.file_name,
            mime_type: upload.mime_type,
            bytes,
            preview: preview.clone(),
        });
        (preview, previous)
    }

    pub fn current(&self) -> Option<&SourceImage> {
        self.current.as_ref()
    }

    pub fn current_preview(&self) -> Option<DisplayRef> {
        self.current.as_ref().map(|source| source.preview.clone())
    }

    pub fn clear(&mut self) -> Option<SourceImage> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, bytes: &[u8]) -> ImageUpload {
        ImageUpload::new(name, Some("image/png".into()), bytes.to_vec())
    }

    #[test]
    fn preview_tracks_latest_selection_and_releases_previous() {
        let store = ImageStore::new();
        let mut holder = AssetHolder::new();
        assert!(holder.current_preview().is_none());

        let (first, previous) = holder.select(&store, upload("a.png", b"first"));
        assert!(previous.is_none());
        let first_key = first.key().clone();
        drop(first);

        let (_, previous) = holder.select(&store, upload("b.png", b"second"));
        assert_eq!(previous.as_ref().map(|s| s.preview.key()), Some(&first_key));
        drop(previous);

        let preview = holder.current_preview().expect("preview");
        assert_ne!(preview.key(), &first_key);
        assert!(!store.contains(&first_key));
        assert_eq!(holder.current().map(|s| s.file_name.as_str()), Some("b.png"));
    }

    #[test]
    fn blank_file_names_get_a_placeholder() {
        let upload = ImageUpload::new("  ", None, vec![1, 2, 3]);
        assert_eq!(upload.file_name, DEFAULT_UPLOAD_NAME);
    }

    #[test]
    fn clearing_releases_the_preview() {
        let store = ImageStore::new();
        let mut holder = AssetHolder::new();
        holder.select(&store, upload("a.png", b"only"));
        drop(holder.clear());
        assert_eq!(store.live_count(), 0);
    }
}
