use thiserror::Error;

/// Every way the remote call can fail. The session collapses these into a single
/// failure kind; the variants only exist for logs and user messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("colorization service unreachable: {0}")]
    Network(String),
    #[error("colorization service answered with status {0}")]
    Status(u16),
    #[error("malformed colorization response: {0}")]
    Malformed(String),
    #[error("no colorization service configured")]
    Unavailable,
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::Malformed(_) | Self::Unavailable => false,
        }
    }
}
