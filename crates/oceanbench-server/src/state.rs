//! Shared application state for the service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use oceanbench_orchestrator::Orchestrator;

use crate::auth::CronAuth;

/// State shared by every request handler.
pub struct AppState {
    /// The per-site orchestrator.
    pub orchestrator: Arc<Orchestrator>,
    /// Cron token verifier. `None` in standalone mode, where the tick
    /// endpoint is open and the site comes from the query string.
    pub auth: Option<CronAuth>,
    /// Process start, for the health surface.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Assemble the shared state.
    pub fn new(orchestrator: Arc<Orchestrator>, auth: Option<CronAuth>) -> Self {
        Self {
            orchestrator,
            auth,
            started_at: Utc::now(),
        }
    }
}
