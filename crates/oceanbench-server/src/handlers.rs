//! Request handlers for the service endpoints.
//!
//! `GET /checkbroadcasts` is the cron trigger: verify the token, extract
//! the site key, run one tick, and answer with the tick report. In
//! standalone mode (no verifier configured) the site key comes from the
//! `skey` query parameter instead.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use oceanbench_types::SiteKey;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for `GET /checkbroadcasts`.
#[derive(Debug, serde::Deserialize)]
pub struct CheckQuery {
    /// Token fallback for callers that cannot set headers.
    pub token: Option<String>,
    /// Site key, accepted only in standalone (unauthenticated) mode.
    pub skey: Option<i64>,
}

/// Pull the bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// `GET /checkbroadcasts` -- run one tick for the authorised site.
pub async fn check_broadcasts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CheckQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let site = match &state.auth {
        Some(auth) => {
            let token = bearer_token(&headers)
                .or(query.token.as_deref())
                .ok_or_else(|| ApiError::Unauthorized(String::from("no token presented")))?;
            auth.verify(token)?
        }
        None => query
            .skey
            .map(SiteKey)
            .ok_or_else(|| ApiError::BadRequest(String::from("skey query parameter required")))?,
    };

    let report = state.orchestrator.tick_site(site, Utc::now()).await?;
    Ok(Json(report))
}

/// `GET /healthz` -- service liveness and build info.
pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime,
    }))
}
