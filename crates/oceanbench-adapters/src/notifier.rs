//! Rate-limited operations notifications.
//!
//! Each `(site, kind, recipient)` is throttled by a persisted timestamp
//! record named `"_<kind>.<recipient>"`: a send inside the suppression
//! window is dropped. The window defaults to 60 minutes and is
//! overridable through `OPS_PERIOD`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use oceanbench_types::{NotifyKind, SiteKey};
use oceanbench_store::{notify_var, VarStore};

use crate::error::AdapterError;

/// The operations notification capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notify operations about a site problem. Implementations apply
    /// their own rate limiting; a suppressed send is not an error.
    async fn notify(
        &self,
        site: SiteKey,
        kind: NotifyKind,
        message: &str,
    ) -> Result<(), AdapterError>;
}

/// [`Notifier`] that posts to an operations webhook, throttled through
/// the variable store.
pub struct OpsNotifier {
    vars: Arc<dyn VarStore>,
    client: reqwest::Client,
    endpoint: Option<String>,
    recipient: String,
    period: TimeDelta,
}

impl OpsNotifier {
    /// Create a notifier.
    ///
    /// With no `endpoint` the notifier only logs, which is what
    /// standalone deployments want.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the HTTP client cannot be
    /// built.
    pub fn new(
        vars: Arc<dyn VarStore>,
        endpoint: Option<String>,
        recipient: &str,
        period: TimeDelta,
        timeout: std::time::Duration,
    ) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Config(format!("notifier client: {e}")))?;
        Ok(Self {
            vars,
            client,
            endpoint,
            recipient: recipient.to_owned(),
            period,
        })
    }

    /// Whether the rate-limit record for `(site, kind)` is still fresh.
    async fn suppressed(&self, site: SiteKey, kind: NotifyKind) -> Result<bool, AdapterError> {
        let name = notify_var(kind.as_str(), &self.recipient);
        match self.vars.get_var(site, &name).await {
            Ok(record) => {
                Ok(Utc::now().signed_duration_since(record.updated) < self.period)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(AdapterError::Store(e)),
        }
    }

    async fn stamp(&self, site: SiteKey, kind: NotifyKind) -> Result<(), AdapterError> {
        let name = notify_var(kind.as_str(), &self.recipient);
        self.vars.set_var(site, &name, "sent").await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for OpsNotifier {
    async fn notify(
        &self,
        site: SiteKey,
        kind: NotifyKind,
        message: &str,
    ) -> Result<(), AdapterError> {
        if self.suppressed(site, kind).await? {
            tracing::debug!(%site, kind = kind.as_str(), "Notification suppressed by rate limit");
            return Ok(());
        }

        if let Some(endpoint) = &self.endpoint {
            let body = serde_json::json!({
                "site": site.into_inner(),
                "kind": kind.as_str(),
                "recipient": self.recipient,
                "message": message,
            });
            let response = self.client.post(endpoint).json(&body).send().await?;
            if !response.status().is_success() {
                return Err(AdapterError::from_response(response).await);
            }
        } else {
            tracing::warn!(%site, kind = kind.as_str(), %message, "Operations notification");
        }

        self.stamp(site, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oceanbench_store::{MemStore, VarRecord};

    fn notifier(store: Arc<MemStore>, period_mins: i64) -> OpsNotifier {
        OpsNotifier::new(
            store,
            None,
            "ops",
            TimeDelta::minutes(period_mins),
            std::time::Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn second_send_inside_window_is_suppressed() {
        let store = Arc::new(MemStore::new());
        let ops = notifier(store.clone(), 60);

        ops.notify(SiteKey(3), NotifyKind::Health, "bad health")
            .await
            .unwrap();
        let stamp = store.get_var(SiteKey(3), "_health.ops").await.unwrap();

        ops.notify(SiteKey(3), NotifyKind::Health, "still bad")
            .await
            .unwrap();
        let stamp_after = store.get_var(SiteKey(3), "_health.ops").await.unwrap();
        // Suppressed send must not refresh the stamp.
        assert_eq!(stamp.updated, stamp_after.updated);
    }

    #[tokio::test]
    async fn different_kinds_rate_limit_independently() {
        let store = Arc::new(MemStore::new());
        let ops = notifier(store.clone(), 60);

        ops.notify(SiteKey(3), NotifyKind::Health, "bad health")
            .await
            .unwrap();
        ops.notify(SiteKey(3), NotifyKind::Hardware, "camera down")
            .await
            .unwrap();

        assert!(store.get_var(SiteKey(3), "_health.ops").await.is_ok());
        assert!(store.get_var(SiteKey(3), "_hardware.ops").await.is_ok());
    }

    #[tokio::test]
    async fn stale_stamp_allows_resend() {
        let store = Arc::new(MemStore::new());
        let ops = notifier(store.clone(), 60);

        store
            .put_var_record(
                SiteKey(3),
                "_health.ops",
                &VarRecord {
                    value: String::from("sent"),
                    updated: Utc::now() - TimeDelta::minutes(61),
                },
            )
            .await
            .unwrap();

        ops.notify(SiteKey(3), NotifyKind::Health, "bad again")
            .await
            .unwrap();
        let stamp = store.get_var(SiteKey(3), "_health.ops").await.unwrap();
        assert!(Utc::now().signed_duration_since(stamp.updated) < TimeDelta::minutes(1));
    }
}
