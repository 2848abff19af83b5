use client_core::{DownloadError, SessionError};
use shared::error::TransportError;

/// Turns a session failure into a one-line message for the terminal.
pub fn describe_failure(err: &SessionError) -> String {
    match err {
        SessionError::NoSelection => "No image selected; pick one with `select <path>` first.".into(),
        SessionError::Busy => {
            "A colorization is already running; wait for it to finish.".into()
        }
        SessionError::Transport(err) => describe_transport(err),
    }
}

fn describe_transport(err: &TransportError) -> String {
    let hint = if err.is_retryable() {
        " Try again shortly."
    } else {
        ""
    };
    match err {
        TransportError::Network(detail) => {
            format!("Colorization service unreachable ({detail}); check --service-url.{hint}")
        }
        TransportError::Status(code) if (400..500).contains(code) => {
            format!("The service rejected the image (HTTP {code}).{hint}")
        }
        TransportError::Status(code) => format!("The service failed (HTTP {code}).{hint}"),
        TransportError::Malformed(detail) => {
            format!("The service sent back something that is not an image: {detail}")
        }
        TransportError::Unavailable => "No colorization service is configured.".into(),
    }
}

pub fn describe_download_failure(err: &DownloadError) -> String {
    match err {
        DownloadError::Released(_) => {
            "That image is no longer available; colorize it again to download.".into()
        }
        DownloadError::Io { path, source } => {
            format!("Could not save to {}: {source}", path.display())
        }
    }
}
