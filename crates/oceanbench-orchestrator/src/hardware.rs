//! The hardware state machine.
//!
//! Drives the camera rig through `off`, `starting`, `on`, `stopping`,
//! `restarting`, and `failure`. Power changes are writes into the
//! device-variable store; convergence is observed through the camera's
//! `uptime` freshness probe on each `time` event. Every transition is
//! committed through the transactional update path in the same commit
//! that records the new state tag.
//!
//! Starts are voltage-gated: when the controller reports a battery
//! voltage below the config's streaming threshold, the machine sits in
//! `starting` with `recovering_voltage` set, withholding the power-on
//! actions until the voltage recovers. Recovery that outlasts the
//! config's timeout declares `failure` and notifies operations.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use oceanbench_types::{Event, HardwareState, HardwareStateData, NotifyKind};

use crate::bus::EventHandler;
use crate::context::TickContext;
use crate::error::OrchestratorError;

/// The camera rig lifecycle machine.
#[derive(Debug)]
pub struct HardwareMachine {
    state: HardwareState,
    data: HardwareStateData,
}

impl HardwareMachine {
    /// Rehydrate from the committed hardware state tag.
    ///
    /// An empty tag is a fresh record and rehydrates to `off`; an
    /// unrecognised tag is config corruption.
    pub fn rehydrate(
        tag: &str,
        data: HardwareStateData,
        uuid: uuid::Uuid,
    ) -> Result<Self, OrchestratorError> {
        let state = if tag.is_empty() {
            HardwareState::Off
        } else {
            HardwareState::from_tag(tag).ok_or_else(|| OrchestratorError::CorruptConfig {
                uuid,
                reason: format!("unknown hardware state tag {tag:?}"),
            })?
        };
        Ok(Self { state, data })
    }

    /// The current state.
    pub const fn state(&self) -> HardwareState {
        self.state
    }

    /// Commit a transition and update the in-memory state.
    async fn transition(
        &mut self,
        ctx: &mut TickContext,
        to: HardwareState,
    ) -> Result<(), OrchestratorError> {
        self.state = to;
        self.data.last_entered = Some(ctx.now);
        if to != HardwareState::Starting {
            self.data.voltage_recovery_started = None;
        }
        let recovering = self.data.voltage_recovery_started.is_some();
        let in_failure = to == HardwareState::Failure;
        let blob = self.data.to_value();
        ctx.commit(move |cfg| {
            cfg.hardware_state = to.tag().to_owned();
            cfg.hardware_state_data = blob;
            cfg.recovering_voltage = recovering;
            cfg.in_failure = in_failure;
        })
        .await
    }

    /// Begin a start: voltage-gate, then write the power-on actions.
    async fn begin_start(&mut self, ctx: &mut TickContext) -> Result<Vec<Event>, OrchestratorError> {
        let site = ctx.site();
        let voltage = match ctx
            .camera
            .battery_voltage(site, &ctx.cfg.controller_mac)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Voltage read failed; retrying next tick");
                return Ok(Vec::new());
            }
        };

        if let Some(v) = voltage
            && ctx.cfg.required_streaming_voltage > 0.0
            && v < ctx.cfg.required_streaming_voltage
        {
            tracing::info!(
                uuid = %ctx.cfg.uuid,
                voltage = v,
                required = ctx.cfg.required_streaming_voltage,
                "Voltage below streaming threshold; entering recovery"
            );
            self.data.voltage_recovery_started = Some(ctx.now);
            self.transition(ctx, HardwareState::Starting).await?;
            return Ok(Vec::new());
        }

        if let Err(e) = ctx.camera.start(&ctx.cfg).await {
            tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Camera start failed; retrying next tick");
            return Ok(Vec::new());
        }
        self.data.voltage_recovery_started = None;
        self.transition(ctx, HardwareState::Starting).await?;
        Ok(Vec::new())
    }

    /// Begin a stop by writing the power-off actions.
    async fn begin_stop(
        &mut self,
        ctx: &mut TickContext,
        to: HardwareState,
    ) -> Result<Vec<Event>, OrchestratorError> {
        if let Err(e) = ctx.camera.stop(&ctx.cfg).await {
            tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Camera stop failed; retrying next tick");
            return Ok(Vec::new());
        }
        self.transition(ctx, to).await?;
        Ok(Vec::new())
    }

    /// Elapsed time since the current state was entered.
    fn residency(&self, now: DateTime<Utc>) -> TimeDelta {
        self.data
            .last_entered
            .map_or(TimeDelta::zero(), |entered| {
                now.signed_duration_since(entered)
            })
    }

    /// The `time` reaction: voltage recovery, liveness probes, and the
    /// transient-state timeouts.
    async fn on_time(
        &mut self,
        ctx: &mut TickContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, OrchestratorError> {
        let site = ctx.site();
        match self.state {
            HardwareState::Starting if self.data.voltage_recovery_started.is_some() => {
                self.on_voltage_recovery(ctx, now).await
            }
            HardwareState::Starting => {
                let probe = ctx
                    .camera
                    .event_if_status(site, &ctx.cfg.camera_mac, Event::HardwareStarted, true)
                    .await;
                match probe {
                    Ok(Some(event)) => Ok(vec![event]),
                    Ok(None) if self.residency(now) > ctx.settings.hardware_timeout => {
                        tracing::warn!(uuid = %ctx.cfg.uuid, "Hardware start timed out");
                        ctx.notify(
                            NotifyKind::Hardware,
                            &format!("camera {} failed to start in time", ctx.cfg.camera_mac),
                        )
                        .await;
                        self.transition(ctx, HardwareState::Off).await?;
                        Ok(vec![Event::HardwareStartFailed])
                    }
                    Ok(None) => Ok(Vec::new()),
                    Err(e) => {
                        tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Liveness probe failed");
                        Ok(Vec::new())
                    }
                }
            }
            HardwareState::Stopping => {
                let probe = ctx
                    .camera
                    .event_if_status(site, &ctx.cfg.camera_mac, Event::HardwareStopped, false)
                    .await;
                match probe {
                    Ok(Some(event)) => Ok(vec![event]),
                    Ok(None) if self.residency(now) > ctx.settings.hardware_timeout => {
                        tracing::warn!(uuid = %ctx.cfg.uuid, "Hardware stop timed out");
                        ctx.notify(
                            NotifyKind::Hardware,
                            &format!("camera {} failed to stop in time", ctx.cfg.camera_mac),
                        )
                        .await;
                        self.transition(ctx, HardwareState::On).await?;
                        Ok(vec![Event::HardwareStopFailed])
                    }
                    Ok(None) => Ok(Vec::new()),
                    Err(e) => {
                        tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Liveness probe failed");
                        Ok(Vec::new())
                    }
                }
            }
            HardwareState::Restarting => {
                // Wait for the camera to die, then start it again.
                match ctx.camera.is_alive(site, &ctx.cfg.camera_mac).await {
                    Ok(false) => self.begin_start(ctx).await,
                    Ok(true) => Ok(Vec::new()),
                    Err(e) => {
                        tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Liveness probe failed");
                        Ok(Vec::new())
                    }
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Voltage recovery: re-read each tick, power on once recovered,
    /// declare failure after the config's recovery timeout.
    async fn on_voltage_recovery(
        &mut self,
        ctx: &mut TickContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, OrchestratorError> {
        let site = ctx.site();
        let voltage = match ctx
            .camera
            .battery_voltage(site, &ctx.cfg.controller_mac)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Voltage read failed");
                return Ok(Vec::new());
            }
        };

        let recovered = voltage.is_none_or(|v| v >= ctx.cfg.required_streaming_voltage);
        if recovered {
            tracing::info!(uuid = %ctx.cfg.uuid, "Voltage recovered; powering camera on");
            if let Err(e) = ctx.camera.start(&ctx.cfg).await {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Camera start failed; retrying next tick");
                return Ok(Vec::new());
            }
            self.data.voltage_recovery_started = None;
            self.transition(ctx, HardwareState::Starting).await?;
            return Ok(Vec::new());
        }

        let waited = self
            .data
            .voltage_recovery_started
            .map_or(TimeDelta::zero(), |since| now.signed_duration_since(since));
        let timeout = TimeDelta::seconds(i64::try_from(ctx.cfg.voltage_recovery_timeout).unwrap_or(i64::MAX));
        if waited > timeout {
            tracing::error!(uuid = %ctx.cfg.uuid, "Voltage recovery timed out; declaring hardware failure");
            ctx.notify(
                NotifyKind::Hardware,
                &format!(
                    "rig {} voltage did not recover within {}s",
                    ctx.cfg.controller_mac, ctx.cfg.voltage_recovery_timeout
                ),
            )
            .await;
            self.transition(ctx, HardwareState::Failure).await?;
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl EventHandler for HardwareMachine {
    fn name(&self) -> &'static str {
        "hardware"
    }

    async fn handle(
        &mut self,
        ctx: &mut TickContext,
        event: &Event,
    ) -> Result<Vec<Event>, OrchestratorError> {
        match (self.state, event) {
            (HardwareState::Off | HardwareState::Failure, Event::HardwareStartRequest) => {
                self.begin_start(ctx).await
            }
            // A repeated start request while already starting (or already
            // on) re-issues the started signal iff the camera is in fact
            // alive.
            (HardwareState::Starting | HardwareState::On, Event::HardwareStartRequest) => {
                let probe = ctx
                    .camera
                    .event_if_status(
                        ctx.site(),
                        &ctx.cfg.camera_mac,
                        Event::HardwareStarted,
                        true,
                    )
                    .await;
                match probe {
                    Ok(Some(event)) => Ok(vec![event]),
                    Ok(None) => Ok(Vec::new()),
                    Err(e) => {
                        tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Liveness probe failed");
                        Ok(Vec::new())
                    }
                }
            }
            (HardwareState::Starting, Event::HardwareStarted) => {
                self.transition(ctx, HardwareState::On).await?;
                Ok(Vec::new())
            }
            (HardwareState::Starting, Event::HardwareStartFailed) => {
                self.transition(ctx, HardwareState::Off).await?;
                Ok(Vec::new())
            }
            (HardwareState::On, Event::HardwareStopRequest) => {
                self.begin_stop(ctx, HardwareState::Stopping).await
            }
            (HardwareState::Stopping, Event::HardwareStopped) => {
                self.transition(ctx, HardwareState::Off).await?;
                Ok(Vec::new())
            }
            (HardwareState::Stopping, Event::HardwareStopFailed) => {
                self.transition(ctx, HardwareState::On).await?;
                Ok(Vec::new())
            }
            (HardwareState::On, Event::HardwareResetRequest) => {
                self.begin_stop(ctx, HardwareState::Restarting).await
            }
            (_, Event::Time(now)) => self.on_time(ctx, *now).await,
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OrchestratorSettings;
    use oceanbench_adapters::{CameraControl, FakeForwarder, FakeNotifier, FakePlatform};
    use oceanbench_store::{ConfigStore, MemStore, VarRecord, VarStore};
    use oceanbench_types::{BroadcastConfig, Mac, SiteKey};
    use std::sync::Arc;

    fn rig_config() -> BroadcastConfig {
        BroadcastConfig {
            uuid: uuid::Uuid::new_v4(),
            name: String::from("rig"),
            site_key: SiteKey(3),
            enabled: true,
            camera_mac: Mac::parse("AA:BB:CC:00:11:22").unwrap(),
            controller_mac: Mac::parse("AA:BB:CC:00:11:33").unwrap(),
            on_actions: String::from("CamPower=true"),
            off_actions: String::from("CamPower=false"),
            ..BroadcastConfig::default()
        }
    }

    async fn context_for(cfg: BroadcastConfig, store: Arc<MemStore>) -> TickContext {
        store.put_config(&cfg).await.unwrap();
        TickContext::new(
            Utc::now(),
            cfg,
            Arc::new(OrchestratorSettings::default()),
            store.clone(),
            store.clone(),
            Arc::new(FakePlatform::new()),
            Arc::new(FakeForwarder::new()),
            Arc::new(CameraControl::new(store, TimeDelta::seconds(60))),
            Arc::new(FakeNotifier::new()),
            None,
        )
    }

    async fn mark_alive(store: &MemStore, mac: &Mac) {
        store
            .set_var(SiteKey(3), &oceanbench_store::device_var(mac, "uptime"), "60")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn start_request_powers_on_and_enters_starting() {
        let store = Arc::new(MemStore::new());
        let cfg = rig_config();
        let mut ctx = context_for(cfg, store.clone()).await;
        let mut hsm =
            HardwareMachine::rehydrate("", HardwareStateData::default(), ctx.cfg.uuid).unwrap();

        let raised = hsm.handle(&mut ctx, &Event::HardwareStartRequest).await.unwrap();
        assert!(raised.is_empty());
        assert_eq!(hsm.state(), HardwareState::Starting);
        assert_eq!(ctx.cfg.hardware_state, "starting");

        let power = store
            .get_var(SiteKey(3), "AA:BB:CC:00:11:33.CamPower")
            .await
            .unwrap();
        assert_eq!(power.value, "true");
    }

    #[tokio::test]
    async fn time_in_starting_probes_and_raises_started() {
        let store = Arc::new(MemStore::new());
        let cfg = rig_config();
        let mac = cfg.camera_mac.clone();
        let mut ctx = context_for(cfg, store.clone()).await;
        let mut hsm =
            HardwareMachine::rehydrate("", HardwareStateData::default(), ctx.cfg.uuid).unwrap();
        hsm.handle(&mut ctx, &Event::HardwareStartRequest).await.unwrap();

        // Camera not yet alive: no event.
        let raised = hsm.handle(&mut ctx, &Event::Time(Utc::now())).await.unwrap();
        assert!(raised.is_empty());

        mark_alive(&store, &mac).await;
        let raised = hsm.handle(&mut ctx, &Event::Time(Utc::now())).await.unwrap();
        assert_eq!(raised, vec![Event::HardwareStarted]);

        // Delivering the raised event lands the machine in `on`.
        hsm.handle(&mut ctx, &Event::HardwareStarted).await.unwrap();
        assert_eq!(hsm.state(), HardwareState::On);
        assert_eq!(ctx.cfg.hardware_state, "on");
    }

    #[tokio::test]
    async fn start_timeout_falls_back_to_off() {
        let store = Arc::new(MemStore::new());
        let cfg = rig_config();
        let mut ctx = context_for(cfg, store.clone()).await;
        let mut hsm =
            HardwareMachine::rehydrate("", HardwareStateData::default(), ctx.cfg.uuid).unwrap();
        hsm.handle(&mut ctx, &Event::HardwareStartRequest).await.unwrap();

        let later = Utc::now() + TimeDelta::minutes(6);
        let raised = hsm.handle(&mut ctx, &Event::Time(later)).await.unwrap();
        assert_eq!(raised, vec![Event::HardwareStartFailed]);
        assert_eq!(hsm.state(), HardwareState::Off);
    }

    #[tokio::test]
    async fn stop_sequence_converges_when_uptime_goes_stale() {
        let store = Arc::new(MemStore::new());
        let cfg = rig_config();
        let mac = cfg.camera_mac.clone();
        let mut ctx = context_for(cfg, store.clone()).await;
        let mut hsm = HardwareMachine::rehydrate(
            "on",
            HardwareStateData {
                last_entered: Some(Utc::now()),
                ..HardwareStateData::default()
            },
            ctx.cfg.uuid,
        )
        .unwrap();
        mark_alive(&store, &mac).await;

        hsm.handle(&mut ctx, &Event::HardwareStopRequest).await.unwrap();
        assert_eq!(hsm.state(), HardwareState::Stopping);

        // Still alive: no stopped event yet.
        let raised = hsm.handle(&mut ctx, &Event::Time(Utc::now())).await.unwrap();
        assert!(raised.is_empty());

        // Stale uptime: stopped.
        store
            .put_device_var(
                SiteKey(3),
                &mac,
                "uptime",
                &VarRecord {
                    value: String::from("60"),
                    updated: Utc::now() - TimeDelta::minutes(10),
                },
            )
            .await
            .unwrap();
        let raised = hsm.handle(&mut ctx, &Event::Time(Utc::now())).await.unwrap();
        assert_eq!(raised, vec![Event::HardwareStopped]);
        hsm.handle(&mut ctx, &Event::HardwareStopped).await.unwrap();
        assert_eq!(hsm.state(), HardwareState::Off);
    }

    #[tokio::test]
    async fn low_voltage_gates_the_start() {
        let store = Arc::new(MemStore::new());
        let mut cfg = rig_config();
        cfg.required_streaming_voltage = 24.0;
        cfg.voltage_recovery_timeout = 3600;
        let controller = cfg.controller_mac.clone();
        let mut ctx = context_for(cfg, store.clone()).await;

        store
            .set_var(
                SiteKey(3),
                &oceanbench_store::device_var(&controller, "batteryVoltage"),
                "22.1",
            )
            .await
            .unwrap();

        let mut hsm =
            HardwareMachine::rehydrate("", HardwareStateData::default(), ctx.cfg.uuid).unwrap();
        hsm.handle(&mut ctx, &Event::HardwareStartRequest).await.unwrap();

        assert_eq!(hsm.state(), HardwareState::Starting);
        assert!(ctx.cfg.recovering_voltage);
        // Power-on actions withheld.
        assert!(store
            .get_var(SiteKey(3), "AA:BB:CC:00:11:33.CamPower")
            .await
            .is_err());

        // Voltage recovers: actions written, recovery flag cleared.
        store
            .set_var(
                SiteKey(3),
                &oceanbench_store::device_var(&controller, "batteryVoltage"),
                "24.6",
            )
            .await
            .unwrap();
        hsm.handle(&mut ctx, &Event::Time(Utc::now())).await.unwrap();
        assert!(!ctx.cfg.recovering_voltage);
        assert_eq!(
            store
                .get_var(SiteKey(3), "AA:BB:CC:00:11:33.CamPower")
                .await
                .unwrap()
                .value,
            "true"
        );
    }

    #[tokio::test]
    async fn voltage_recovery_timeout_declares_failure() {
        let store = Arc::new(MemStore::new());
        let mut cfg = rig_config();
        cfg.required_streaming_voltage = 24.0;
        cfg.voltage_recovery_timeout = 600;
        let controller = cfg.controller_mac.clone();
        let mut ctx = context_for(cfg, store.clone()).await;

        store
            .set_var(
                SiteKey(3),
                &oceanbench_store::device_var(&controller, "batteryVoltage"),
                "20.0",
            )
            .await
            .unwrap();

        let mut hsm =
            HardwareMachine::rehydrate("", HardwareStateData::default(), ctx.cfg.uuid).unwrap();
        hsm.handle(&mut ctx, &Event::HardwareStartRequest).await.unwrap();

        let later = Utc::now() + TimeDelta::seconds(700);
        hsm.handle(&mut ctx, &Event::Time(later)).await.unwrap();
        assert_eq!(hsm.state(), HardwareState::Failure);
        assert!(ctx.cfg.in_failure);
        assert_eq!(ctx.cfg.hardware_state, "failure");
    }

    #[tokio::test]
    async fn unknown_tag_is_corruption() {
        let err =
            HardwareMachine::rehydrate("rebooting", HardwareStateData::default(), uuid::Uuid::new_v4())
                .unwrap_err();
        assert!(err.is_corruption());
    }
}
