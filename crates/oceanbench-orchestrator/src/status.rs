//! The status handler.
//!
//! On `statusCheckDue`, asks the platform for the broadcast's lifecycle
//! status. A terminal status (`complete`, `revoked`) means the session is
//! over regardless of what the schedule says, so `finish` is published
//! and the broadcast machine closes out.

use async_trait::async_trait;
use oceanbench_types::Event;

use crate::bus::EventHandler;
use crate::context::TickContext;
use crate::error::OrchestratorError;

/// Bridges platform lifecycle probes onto the bus.
#[derive(Debug, Default)]
pub struct StatusHandler;

impl StatusHandler {
    /// A new handler.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for StatusHandler {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn handle(
        &mut self,
        ctx: &mut TickContext,
        event: &Event,
    ) -> Result<Vec<Event>, OrchestratorError> {
        if !matches!(event, Event::StatusCheckDue) {
            return Ok(Vec::new());
        }
        if ctx.cfg.broadcast_id.is_empty() {
            tracing::debug!(uuid = %ctx.cfg.uuid, "No broadcast bound; skipping status check");
            return Ok(Vec::new());
        }

        match ctx.platform.broadcast_status(&ctx.cfg.broadcast_id).await {
            Ok(status) if status.is_terminal() => {
                tracing::info!(uuid = %ctx.cfg.uuid, ?status, "Platform reports terminal status");
                Ok(vec![Event::Finish])
            }
            Ok(status) => {
                tracing::debug!(uuid = %ctx.cfg.uuid, ?status, "Platform status");
                Ok(Vec::new())
            }
            Err(e) => {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Status probe failed");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OrchestratorSettings;
    use chrono::{TimeDelta, Utc};
    use oceanbench_adapters::{CameraControl, FakeForwarder, FakeNotifier, FakePlatform};
    use oceanbench_store::{ConfigStore, MemStore};
    use oceanbench_types::{BroadcastConfig, BroadcastLifecycle, SiteKey};
    use std::sync::Arc;

    async fn context_with(platform: Arc<FakePlatform>) -> TickContext {
        let store = Arc::new(MemStore::new());
        let cfg = BroadcastConfig {
            uuid: uuid::Uuid::new_v4(),
            site_key: SiteKey(3),
            broadcast_id: String::from("B1"),
            ..BroadcastConfig::default()
        };
        store.put_config(&cfg).await.unwrap();
        TickContext::new(
            Utc::now(),
            cfg,
            Arc::new(OrchestratorSettings::default()),
            store.clone(),
            store.clone(),
            platform,
            Arc::new(FakeForwarder::new()),
            Arc::new(CameraControl::new(store, TimeDelta::seconds(60))),
            Arc::new(FakeNotifier::new()),
            None,
        )
    }

    #[tokio::test]
    async fn live_status_raises_nothing() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_status(BroadcastLifecycle::Live);
        let mut ctx = context_with(platform).await;
        let mut handler = StatusHandler::new();

        let raised = handler.handle(&mut ctx, &Event::StatusCheckDue).await.unwrap();
        assert!(raised.is_empty());
    }

    #[tokio::test]
    async fn terminal_status_raises_finish() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_status(BroadcastLifecycle::Complete);
        let mut ctx = context_with(platform).await;
        let mut handler = StatusHandler::new();

        let raised = handler.handle(&mut ctx, &Event::StatusCheckDue).await.unwrap();
        assert_eq!(raised, vec![Event::Finish]);
    }

    #[tokio::test]
    async fn other_events_are_ignored() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_status(BroadcastLifecycle::Complete);
        let mut ctx = context_with(platform.clone()).await;
        let mut handler = StatusHandler::new();

        let raised = handler.handle(&mut ctx, &Event::Start).await.unwrap();
        assert!(raised.is_empty());
        assert!(platform.calls().is_empty());
    }
}
