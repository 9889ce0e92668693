//! Error types for the capability adapters.
//!
//! All adapter failures are transient from the orchestrator's point of
//! view: they are logged, the current tick carries on without a state
//! transition, and the next tick retries.

use oceanbench_store::StoreError;

/// Errors that can occur in an external capability adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The HTTP request could not be sent or timed out.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("remote returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for the log line.
        body: String,
    },

    /// The response body could not be interpreted.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// A device-variable store operation failed.
    #[error("device store error: {0}")]
    Store(#[from] StoreError),

    /// The config lacks a binding the call needs (for example an empty
    /// chat ID).
    #[error("missing binding: {0}")]
    MissingBinding(String),

    /// The adapter itself is misconfigured.
    #[error("adapter configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    /// Map a non-success HTTP response into [`AdapterError::Status`].
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("unable to read error body"));
        Self::Status { status, body }
    }
}
