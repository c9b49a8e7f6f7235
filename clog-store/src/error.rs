//! Error types for clog-store

use thiserror::Error;

/// Errors that can occur in a document collection
#[derive(Debug, Error)]
pub enum StoreError {
    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// MessagePack encoding error
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document not found
    #[error("Document with ID {0} not found")]
    NotFound(String),

    /// A value exceeded the backend's per-value size limit.
    ///
    /// Backends recover from this internally; it never reaches callers.
    #[error("Value of {size} bytes exceeds the {limit} byte limit")]
    OversizeValue { size: usize, limit: usize },

    /// A stored multipart value is missing chunks
    #[error("Corrupt multipart value for {id}: {reason}")]
    CorruptMultipart { id: String, reason: String },

    /// A value that should be a JSON object was something else
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create an invalid document error
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    /// Whether this is the checked NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
