//! The tick driver and rehydrator.
//!
//! One tick per site: load every broadcast config, and for each enabled
//! one rehydrate both state machines from the committed tags, wire up the
//! per-broadcast bus, replay any events queued from the previous run
//! (FIFO, before any new `time`), publish `time(now)`, and persist
//! whatever spilled past the tick's deadline back into the config for the
//! next run.
//!
//! Rehydration is deterministic: the projection tuple is total over the
//! enumerated combinations, and anything else is logged as "unknown state
//! for broadcast" and skipped without mutation.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use oceanbench_adapters::{CameraControl, Forwarder, Notifier, VideoPlatform};
use oceanbench_store::{ConfigStore, VarStore};
use oceanbench_types::{BroadcastConfig, Event, SiteKey};
use serde::Serialize;
use uuid::Uuid;

use crate::broadcast::BroadcastMachine;
use crate::bus::EventBus;
use crate::chat::ChatHandler;
use crate::context::TickContext;
use crate::error::OrchestratorError;
use crate::hardware::HardwareMachine;
use crate::health::HealthHandler;
use crate::settings::OrchestratorSettings;
use crate::status::StatusHandler;

/// What happened to one broadcast during a tick.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastOutcome {
    /// The broadcast.
    pub uuid: Uuid,
    /// Committed broadcast state tag after the tick.
    pub broadcast_state: String,
    /// Committed hardware state tag after the tick.
    pub hardware_state: String,
    /// Tags of every event published, in publish order.
    pub events: Vec<String>,
    /// Event tags spilled for next-tick redelivery.
    pub spilled: Vec<String>,
}

/// Summary of one site tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// The site that ticked.
    pub site: SiteKey,
    /// The tick instant.
    pub time: DateTime<Utc>,
    /// Outcomes of the broadcasts that ran.
    pub broadcasts: Vec<BroadcastOutcome>,
    /// Broadcasts skipped because they are disabled.
    pub disabled: usize,
    /// Broadcasts skipped because their records could not be interpreted.
    pub corrupt: usize,
    /// Broadcasts that failed on a store error.
    pub failed: usize,
}

/// The per-site broadcast orchestrator.
pub struct Orchestrator {
    store: Arc<dyn ConfigStore>,
    vars: Arc<dyn VarStore>,
    platform: Arc<dyn VideoPlatform>,
    forwarder: Arc<dyn Forwarder>,
    notifier: Arc<dyn Notifier>,
    camera: Arc<CameraControl>,
    settings: Arc<OrchestratorSettings>,
}

impl Orchestrator {
    /// Wire an orchestrator over its capabilities.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        vars: Arc<dyn VarStore>,
        platform: Arc<dyn VideoPlatform>,
        forwarder: Arc<dyn Forwarder>,
        notifier: Arc<dyn Notifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        let camera = Arc::new(CameraControl::new(
            Arc::clone(&vars),
            settings.monitor_period,
        ));
        Self {
            store,
            vars,
            platform,
            forwarder,
            notifier,
            camera,
            settings: Arc::new(settings),
        }
    }

    /// The active timing and retry policy.
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one tick for every broadcast of a site.
    ///
    /// Broadcasts run as concurrent tasks sharing no in-memory state;
    /// a corrupt or failing broadcast never takes down the others.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] only if the site's configs
    /// cannot be listed at all.
    pub async fn tick_site(
        &self,
        site: SiteKey,
        now: DateTime<Utc>,
    ) -> Result<TickReport, OrchestratorError> {
        let configs = self.store.list_configs(site).await?;
        tracing::info!(%site, broadcasts = configs.len(), "Tick");

        let mut report = TickReport {
            site,
            time: now,
            broadcasts: Vec::new(),
            disabled: 0,
            corrupt: 0,
            failed: 0,
        };

        let (enabled, disabled): (Vec<_>, Vec<_>) =
            configs.into_iter().partition(|cfg| cfg.enabled);
        report.disabled = disabled.len();

        let runs = enabled
            .into_iter()
            .map(|cfg| self.tick_broadcast(cfg, now));
        for outcome in futures::future::join_all(runs).await {
            match outcome {
                Ok(done) => report.broadcasts.push(done),
                Err(e) if e.is_corruption() => {
                    tracing::error!(%site, error = %e, "Unknown state for broadcast; skipping");
                    report.corrupt = report.corrupt.saturating_add(1);
                }
                Err(e) => {
                    tracing::error!(%site, error = %e, "Broadcast tick failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }
        Ok(report)
    }

    /// Run one broadcast's tick: rehydrate, replay, `time`, spill.
    pub async fn tick_broadcast(
        &self,
        mut cfg: BroadcastConfig,
        now: DateTime<Utc>,
    ) -> Result<BroadcastOutcome, OrchestratorError> {
        let uuid = cfg.uuid;

        // Promote the name-suffix secondary convention into the explicit
        // field before anything reads it.
        if cfg.promote_secondary_flag() {
            let flag = cfg.is_secondary;
            cfg = self
                .store
                .update_config(cfg.site_key, uuid, Box::new(move |c| c.is_secondary = flag))
                .await?;
        }

        // Rehydrate both machines from the committed record.
        let bsm = BroadcastMachine::rehydrate(&cfg)?;
        let hsm = HardwareMachine::rehydrate(&cfg.hardware_state, cfg.hardware_data(), uuid)?;
        tracing::debug!(
            %uuid,
            broadcast = bsm.state().tag(),
            hardware = hsm.state().tag(),
            "Rehydrated"
        );

        let queued = cfg.events.clone();
        let deadline = Instant::now().checked_add(self.settings.tick_budget);
        let mut ctx = TickContext::new(
            now,
            cfg,
            Arc::clone(&self.settings),
            Arc::clone(&self.store),
            Arc::clone(&self.vars),
            Arc::clone(&self.platform),
            Arc::clone(&self.forwarder),
            Arc::clone(&self.camera),
            Arc::clone(&self.notifier),
            deadline,
        );

        let mut bus = EventBus::new();
        bus.subscribe(Box::new(bsm));
        bus.subscribe(Box::new(hsm));
        bus.subscribe(Box::new(HealthHandler::new()));
        bus.subscribe(Box::new(StatusHandler::new()));
        bus.subscribe(Box::new(ChatHandler::new()));

        // Replay queued events ahead of the new time event, consuming the
        // queue in the same commit order it was written.
        if !queued.is_empty() {
            ctx.commit(|c| c.events.clear()).await?;
            for tag in queued {
                match Event::from_tag(&tag, now) {
                    Some(event) => {
                        tracing::info!(%uuid, event = %event, "Redelivering queued event");
                        bus.publish(&mut ctx, event).await?;
                    }
                    None => {
                        tracing::warn!(%uuid, %tag, "Dropping unknown queued event tag");
                    }
                }
            }
        }

        bus.publish(&mut ctx, Event::Time(now)).await?;

        // Anything that spilled past the deadline is queued for the next
        // tick.
        let spilled = ctx.take_spilled();
        if !spilled.is_empty() {
            let queue = spilled.clone();
            ctx.commit(move |c| c.events.extend(queue)).await?;
        }

        Ok(BroadcastOutcome {
            uuid,
            broadcast_state: ctx.cfg.broadcast_state.clone(),
            hardware_state: ctx.cfg.hardware_state.clone(),
            events: bus.trace().iter().map(|tag| (*tag).to_owned()).collect(),
            spilled,
        })
    }
}
