//! The standalone tick loop.
//!
//! Cloud deployments get their ticks from the remote cron service; a
//! standalone deployment has no cron, so the process drives itself with
//! a minute-interval loop over the local file store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use oceanbench_orchestrator::Orchestrator;
use oceanbench_types::SiteKey;
use tracing::{error, info};

/// Tick `site` forever at `interval`.
///
/// Runs until the task is aborted; each failed tick is logged and the
/// loop carries on.
pub async fn run_tick_loop(orchestrator: Arc<Orchestrator>, site: SiteKey, interval: Duration) {
    info!(%site, interval_secs = interval.as_secs(), "Standalone tick loop running");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match orchestrator.tick_site(site, Utc::now()).await {
            Ok(report) => {
                info!(
                    %site,
                    broadcasts = report.broadcasts.len(),
                    disabled = report.disabled,
                    corrupt = report.corrupt,
                    failed = report.failed,
                    "Tick complete"
                );
            }
            Err(e) => error!(%site, error = %e, "Tick failed"),
        }
    }
}
