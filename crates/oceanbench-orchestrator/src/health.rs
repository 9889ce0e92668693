//! The health handler.
//!
//! On `healthCheckDue`, probes the platform's stream health and
//! configuration-issue list. Any error-severity issue or a
//! `noData`/`revoked` status counts as an issue: the successive-failure
//! counter goes up and `badHealth` bridges the result to the broadcast
//! machine. A healthy probe clears the counter and publishes
//! `goodHealth`. Probe failures are non-fatal; the next due check
//! retries.

use async_trait::async_trait;
use oceanbench_types::{Event, NotifyKind};

use crate::bus::EventHandler;
use crate::context::TickContext;
use crate::error::OrchestratorError;

/// Successive bad probes before operations hears about it.
const NOTIFY_AFTER_ISSUES: u32 = 3;

/// Bridges platform health probes onto the bus.
#[derive(Debug, Default)]
pub struct HealthHandler;

impl HealthHandler {
    /// A new handler.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for HealthHandler {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn handle(
        &mut self,
        ctx: &mut TickContext,
        event: &Event,
    ) -> Result<Vec<Event>, OrchestratorError> {
        if !matches!(event, Event::HealthCheckDue) {
            return Ok(Vec::new());
        }
        if ctx.cfg.stream_id.is_empty() {
            tracing::debug!(uuid = %ctx.cfg.uuid, "No stream bound; skipping health check");
            return Ok(Vec::new());
        }

        let report = match ctx.platform.health_status(&ctx.cfg.stream_id).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Health probe failed");
                return Ok(Vec::new());
            }
        };

        if report.counts_as_issue() {
            ctx.commit(|cfg| cfg.issues = cfg.issues.saturating_add(1))
                .await?;
            tracing::warn!(
                uuid = %ctx.cfg.uuid,
                status = ?report.status,
                issues = ctx.cfg.issues,
                "Stream health degraded"
            );
            if ctx.cfg.issues >= NOTIFY_AFTER_ISSUES {
                ctx.notify(
                    NotifyKind::Health,
                    &format!(
                        "broadcast {}: {} successive bad health probes (status {:?})",
                        ctx.cfg.name, ctx.cfg.issues, report.status
                    ),
                )
                .await;
            }
            Ok(vec![Event::BadHealth])
        } else {
            if ctx.cfg.issues > 0 {
                ctx.commit(|cfg| cfg.issues = 0).await?;
            }
            Ok(vec![Event::GoodHealth])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OrchestratorSettings;
    use chrono::{TimeDelta, Utc};
    use oceanbench_adapters::{
        CameraControl, ConfigIssue, FakeForwarder, FakeNotifier, FakePlatform, HealthReport,
    };
    use oceanbench_store::{ConfigStore, MemStore};
    use oceanbench_types::{BroadcastConfig, IssueSeverity, SiteKey, StreamHealth};
    use std::sync::Arc;

    async fn context_with(
        platform: Arc<FakePlatform>,
        notifier: Arc<FakeNotifier>,
    ) -> TickContext {
        let store = Arc::new(MemStore::new());
        let cfg = BroadcastConfig {
            uuid: uuid::Uuid::new_v4(),
            name: String::from("Rapid Bay"),
            site_key: SiteKey(3),
            stream_id: String::from("S1"),
            checking_health: true,
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
            notifier,
            None,
        )
    }

    #[tokio::test]
    async fn bad_probe_accumulates_and_bridges_bad_health() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_health(HealthReport {
            status: StreamHealth::NoData,
            issues: Vec::new(),
        });
        let notifier = Arc::new(FakeNotifier::new());
        let mut ctx = context_with(platform, notifier.clone()).await;
        let mut handler = HealthHandler::new();

        let raised = handler.handle(&mut ctx, &Event::HealthCheckDue).await.unwrap();
        assert_eq!(raised, vec![Event::BadHealth]);
        assert_eq!(ctx.cfg.issues, 1);
        // One bad probe is not yet worth a notification.
        assert!(notifier.notes().is_empty());
    }

    #[tokio::test]
    async fn error_severity_issue_counts_even_when_receiving() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_health(HealthReport {
            status: StreamHealth::Good,
            issues: vec![ConfigIssue {
                severity: IssueSeverity::Error,
                kind: String::from("videoCodecMismatch"),
                description: String::new(),
            }],
        });
        let mut ctx = context_with(platform, Arc::new(FakeNotifier::new())).await;
        let mut handler = HealthHandler::new();

        let raised = handler.handle(&mut ctx, &Event::HealthCheckDue).await.unwrap();
        assert_eq!(raised, vec![Event::BadHealth]);
    }

    #[tokio::test]
    async fn healthy_probe_clears_issues_and_bridges_good_health() {
        let platform = Arc::new(FakePlatform::new());
        let mut ctx = context_with(platform, Arc::new(FakeNotifier::new())).await;
        ctx.commit(|cfg| cfg.issues = 2).await.unwrap();
        let mut handler = HealthHandler::new();

        let raised = handler.handle(&mut ctx, &Event::HealthCheckDue).await.unwrap();
        assert_eq!(raised, vec![Event::GoodHealth]);
        assert_eq!(ctx.cfg.issues, 0);
    }

    #[tokio::test]
    async fn sustained_bad_health_notifies_operations() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_health(HealthReport {
            status: StreamHealth::Revoked,
            issues: Vec::new(),
        });
        let notifier = Arc::new(FakeNotifier::new());
        let mut ctx = context_with(platform, notifier.clone()).await;
        let mut handler = HealthHandler::new();

        for _ in 0..3 {
            handler.handle(&mut ctx, &Event::HealthCheckDue).await.unwrap();
        }
        assert_eq!(notifier.count_of(oceanbench_types::NotifyKind::Health), 1);
    }

    #[tokio::test]
    async fn suppress_rule_blocks_the_notification() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_health(HealthReport {
            status: StreamHealth::Revoked,
            issues: Vec::new(),
        });
        let notifier = Arc::new(FakeNotifier::new());
        let mut ctx = context_with(platform, notifier.clone()).await;
        ctx.commit(|cfg| {
            cfg.notify_suppress_rules = vec![oceanbench_types::NotifyKind::Health];
        })
        .await
        .unwrap();
        let mut handler = HealthHandler::new();

        for _ in 0..4 {
            handler.handle(&mut ctx, &Event::HealthCheckDue).await.unwrap();
        }
        assert!(notifier.notes().is_empty());
    }
}
