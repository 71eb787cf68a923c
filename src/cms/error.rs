//! Content service errors

use thiserror::Error;

/// Errors raised while talking to the content service
#[derive(Error, Debug)]
pub enum CmsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Content service returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Unknown release ref: {0}")]
    UnknownRef(String),

    #[error("Malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CmsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CmsError::NotFound(_))
    }

    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CmsError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CmsError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        CmsError::Malformed {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CmsError>;
