//! Error types for the slotwatch service

/// Errors that can occur in the slotwatch service
#[derive(Debug, thiserror::Error)]
pub enum SlotwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Portal login failed: {0}")]
    Login(String),

    #[error("Session expired, re-login required")]
    SessionExpired,

    #[error("Notifier error: {0}")]
    Notifier(String),
}

/// Result type alias for slotwatch operations
pub type Result<T> = std::result::Result<T, SlotwatchError>;
