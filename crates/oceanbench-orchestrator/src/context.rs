//! Per-broadcast tick context.
//!
//! A [`TickContext`] carries everything an event handler may touch during
//! one tick: the config snapshot, the wall-clock instant, the capability
//! adapters, and the transactional commit helpers. The snapshot is
//! refreshed on every commit so handlers always observe the committed
//! record, never a speculative one.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use oceanbench_adapters::{CameraControl, Forwarder, Notifier, VideoPlatform};
use oceanbench_store::{ConfigStore, VarStore};
use oceanbench_types::{BroadcastConfig, BroadcastState, Event, NotifyKind, SiteKey, StateData};

use crate::error::OrchestratorError;
use crate::settings::OrchestratorSettings;

/// Everything one broadcast's event handlers can reach during a tick.
pub struct TickContext {
    /// The tick instant carried by the `time` event.
    pub now: DateTime<Utc>,
    /// Snapshot of the committed config; refreshed on every commit.
    pub cfg: BroadcastConfig,
    /// Timing and retry policy.
    pub settings: Arc<OrchestratorSettings>,
    /// Config persistence (the transactional mutation path).
    pub store: Arc<dyn ConfigStore>,
    /// Device variables and scalars.
    pub vars: Arc<dyn VarStore>,
    /// The video platform.
    pub platform: Arc<dyn VideoPlatform>,
    /// The RTMP forwarder.
    pub forwarder: Arc<dyn Forwarder>,
    /// Camera power control and liveness probing.
    pub camera: Arc<CameraControl>,
    /// Operations notifications.
    pub notifier: Arc<dyn Notifier>,

    deadline: Option<Instant>,
    cancelled: bool,
    spilled: Vec<String>,
}

impl TickContext {
    /// Build a context for one broadcast's tick.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        now: DateTime<Utc>,
        cfg: BroadcastConfig,
        settings: Arc<OrchestratorSettings>,
        store: Arc<dyn ConfigStore>,
        vars: Arc<dyn VarStore>,
        platform: Arc<dyn VideoPlatform>,
        forwarder: Arc<dyn Forwarder>,
        camera: Arc<CameraControl>,
        notifier: Arc<dyn Notifier>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            now,
            cfg,
            settings,
            store,
            vars,
            platform,
            forwarder,
            camera,
            notifier,
            deadline,
            cancelled: false,
            spilled: Vec::new(),
        }
    }

    /// The owning site.
    pub const fn site(&self) -> SiteKey {
        self.cfg.site_key
    }

    /// Whether the tick has been cancelled (explicitly or by deadline).
    /// Once cancelled, published events are rerouted to the spill sink.
    pub fn cancelled(&self) -> bool {
        self.cancelled || self.deadline.is_some_and(|d| Instant::now() > d)
    }

    /// Cancel the tick explicitly.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Reroute an event to the spill sink for next-tick redelivery.
    pub fn spill(&mut self, event: &Event) {
        tracing::info!(event = event.tag(), "Spilling event for redelivery");
        self.spilled.push(event.tag().to_owned());
    }

    /// Drain the spill sink.
    pub fn take_spilled(&mut self) -> Vec<String> {
        std::mem::take(&mut self.spilled)
    }

    /// Commit a mutation through the transactional update path and refresh
    /// the snapshot. This is the only way handlers mutate the record.
    pub async fn commit<F>(&mut self, mutate: F) -> Result<(), OrchestratorError>
    where
        F: FnOnce(&mut BroadcastConfig) + Send + 'static,
    {
        let updated = self
            .store
            .update_config(self.cfg.site_key, self.cfg.uuid, Box::new(mutate))
            .await?;
        self.cfg = updated;
        Ok(())
    }

    /// Commit a broadcast state transition: state tag, projection flags,
    /// and the state-private blob land in one transaction.
    pub async fn commit_broadcast_state(
        &mut self,
        state: BroadcastState,
        data: &StateData,
    ) -> Result<(), OrchestratorError> {
        let blob = data.to_value();
        tracing::info!(uuid = %self.cfg.uuid, state = state.tag(), "Broadcast state transition");
        self.commit(move |cfg| {
            cfg.apply_state(state);
            cfg.state_data = blob;
        })
        .await
    }

    /// Notify operations, honouring the config's suppress rules. Adapter
    /// failures are logged and swallowed; a lost notification must not
    /// fail the tick.
    pub async fn notify(&self, kind: NotifyKind, message: &str) {
        if self.cfg.notify_suppress_rules.contains(&kind) {
            tracing::debug!(
                uuid = %self.cfg.uuid,
                kind = kind.as_str(),
                "Notification suppressed by config rule"
            );
            return;
        }
        if let Err(e) = self.notifier.notify(self.cfg.site_key, kind, message).await {
            tracing::warn!(
                uuid = %self.cfg.uuid,
                kind = kind.as_str(),
                error = %e,
                "Notification failed"
            );
        }
    }
}
