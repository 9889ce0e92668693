//! Axum router construction for the service.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete router:
///
/// - `GET /checkbroadcasts` -- cron tick trigger
/// - `GET /healthz` -- liveness
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/checkbroadcasts", get(handlers::check_broadcasts))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
