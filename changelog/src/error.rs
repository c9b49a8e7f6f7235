//! Error types for the changelog pipeline.

use clog_store::StoreError;
use thiserror::Error;

use crate::sources::git::GitLogError;

/// Errors that can occur while aggregating or reading releases.
#[derive(Debug, Error)]
pub enum ClogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream unavailable: {message}")]
    Upstream {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Git log error: {0}")]
    Git(#[from] GitLogError),

    #[error("Invalid release: {0}")]
    InvalidRelease(String),
}

impl ClogError {
    /// An upstream failure with no underlying transport error
    pub fn upstream(message: impl Into<String>) -> Self {
        ClogError::Upstream {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, ClogError::Upstream { .. })
    }
}

impl From<reqwest::Error> for ClogError {
    fn from(err: reqwest::Error) -> Self {
        let message = match err.url() {
            Some(url) => format!("request to {} failed", url),
            None => "request failed".to_string(),
        };

        ClogError::Upstream {
            message,
            source: Some(err),
        }
    }
}

/// Result type alias for changelog operations.
pub type ClogResult<T> = Result<T, ClogError>;
