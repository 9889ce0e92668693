//! Error types for the HTTP surface.
//!
//! [`ApiError`] unifies all failure modes into one enum that converts
//! into an HTTP response. Auth failures never touch broadcast state.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use oceanbench_orchestrator::OrchestratorError;

use crate::auth::AuthError;

/// Errors surfaced by the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authentication failed (signature or issuer mismatch).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request is malformed (for example, no site key).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A tick failed outright.
    #[error("tick failed: {0}")]
    Tick(#[from] OrchestratorError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingSiteKey => Self::BadRequest(err.to_string()),
            AuthError::Token(_) | AuthError::Issuer(_) => Self::Unauthorized(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Tick(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
