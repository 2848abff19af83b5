//! Wire vocabulary for the remote colorization service.

/// Endpoint accepting a multipart upload and answering with image bytes.
pub const COLORIZE_PATH: &str = "colorize";
/// Multipart part carrying the source image.
pub const FILE_FIELD: &str = "file";
/// Multipart text part carrying the quality flag.
pub const HIGH_QUALITY_FIELD: &str = "high_quality";

pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_DOWNLOAD_NAME: &str = "colorized-image.jpg";
pub const DEFAULT_UPLOAD_NAME: &str = "image";

pub fn quality_flag(high_quality: bool) -> &'static str {
    if high_quality {
        "true"
    } else {
        "false"
    }
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}
