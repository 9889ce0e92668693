//! Error types for the persistence layer.
//!
//! All errors are propagated via [`StoreError`], which wraps the underlying
//! I/O and [`fred`] errors with context about which record was involved.

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("file store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A Redis-compatible store operation failed.
    #[error("datastore error: {0}")]
    Redis(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested record does not exist.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A stored record exists but cannot be interpreted.
    #[error("corrupt record at {key}: {reason}")]
    Corrupt {
        /// Key of the offending record.
        key: String,
        /// Why it could not be interpreted.
        reason: String,
    },

    /// A store configuration problem (bad URL, unusable root directory).
    #[error("store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// True when the error means the record simply is not there, as
    /// opposed to an operational failure.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}
