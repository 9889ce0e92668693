//! The broadcast state machine.
//!
//! One machine instance drives one broadcast through the sixteen canonical
//! states, multiplexing three session flavours: permanent (slate-capable,
//! behind the forwarder), secondary (the permanent broadcast's ingest
//! companion), and direct. The machine is rehydrated each tick from the
//! committed projection flags; every transition commits the new state tag,
//! the projection flags, and the state-private blob in one transaction.
//!
//! Reactions that matter:
//!
//! - `time` drives scheduling: idle broadcasts inside their window start,
//!   live broadcasts outside it finish, slate broadcasts inside it head
//!   back to live, transient states enforce their residency bound, and
//!   live states emit the periodic health/status/chat due events.
//! - `hardwareStarted` while starting triggers the platform start,
//!   bracketed by the committed `attempting_to_start` flag so a crashed
//!   tick can never start the same session twice.
//! - `startFailed` counts toward disablement; `badHealth`/`goodHealth`
//!   flip the unhealthy variants; unhealthy states self-heal at most once
//!   per reset interval.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use oceanbench_types::{
    BroadcastConfig, BroadcastState, Event, Flavor, NotifyKind, StateData, SECONDARY_SUFFIX,
};

use crate::bus::EventHandler;
use crate::context::TickContext;
use crate::error::OrchestratorError;

/// The broadcast lifecycle machine.
#[derive(Debug)]
pub struct BroadcastMachine {
    state: BroadcastState,
    data: StateData,
}

impl BroadcastMachine {
    /// Rehydrate from the committed projection flags.
    ///
    /// The tuple is authoritative; a committed state tag that disagrees
    /// with it (or names no known state) is config corruption and the
    /// broadcast is skipped for the tick.
    pub fn rehydrate(cfg: &BroadcastConfig) -> Result<Self, OrchestratorError> {
        let state = cfg.projection().to_state()?;
        if !cfg.broadcast_state.is_empty() {
            let tagged = BroadcastState::from_tag(&cfg.broadcast_state).ok_or_else(|| {
                OrchestratorError::CorruptConfig {
                    uuid: cfg.uuid,
                    reason: format!("unknown broadcast state tag {:?}", cfg.broadcast_state),
                }
            })?;
            if tagged != state {
                return Err(OrchestratorError::CorruptConfig {
                    uuid: cfg.uuid,
                    reason: format!(
                        "state tag {} does not match projection flags ({})",
                        tagged,
                        state.tag()
                    ),
                });
            }
        }
        Ok(Self {
            state,
            data: cfg.state_data(),
        })
    }

    /// The current state.
    pub const fn state(&self) -> BroadcastState {
        self.state
    }

    /// Commit a plain transition (tag + flags + blob, nothing else).
    async fn transition(
        &mut self,
        ctx: &mut TickContext,
        to: BroadcastState,
    ) -> Result<(), OrchestratorError> {
        self.state = to;
        self.data.last_entered = Some(ctx.now);
        ctx.commit_broadcast_state(to, &self.data).await
    }

    /// Commit only the state-private blob (timestamps moved, no
    /// transition).
    async fn commit_data(&self, ctx: &mut TickContext) -> Result<(), OrchestratorError> {
        let blob = self.data.to_value();
        ctx.commit(move |cfg| cfg.state_data = blob).await
    }

    // -----------------------------------------------------------------------
    // time
    // -----------------------------------------------------------------------

    async fn on_time(
        &mut self,
        ctx: &mut TickContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, OrchestratorError> {
        let state = self.state;

        // A session running ahead of its window closes out.
        if ctx.cfg.before_window(now) && state.is_live() {
            return Ok(vec![Event::Finish]);
        }

        if ctx.cfg.within_window(now) {
            if state.is_idle() {
                return self.enter_starting(ctx).await;
            }
            if state.is_slate() {
                return self.enter_slate_to_live(ctx).await;
            }
            if state.is_live() {
                let mut raised = self.due_checks(ctx, now).await?;
                if state.is_unhealthy() {
                    raised.extend(self.fix(ctx, now).await?);
                }
                return Ok(raised);
            }
            if state.is_starting() || state.is_transitioning() {
                return self.check_transient_timeout(ctx, now).await;
            }
            return Ok(Vec::new());
        }

        if ctx.cfg.after_window(now) && state.is_live() {
            return Ok(vec![Event::Finish]);
        }

        // Transient states honour their residency bound regardless of the
        // schedule.
        if state.is_starting() || state.is_transitioning() {
            return self.check_transient_timeout(ctx, now).await;
        }

        // An unhealthy slate outside its window still self-heals.
        if state.is_unhealthy() {
            return self.fix(ctx, now).await;
        }

        Ok(Vec::new())
    }

    /// Bounded residency for `Starting` and the two transitions: after
    /// the timeout, live->slate falls forward to its terminal slate (the
    /// forwarder is already commanded), everything else reverts to idle
    /// with the camera asked down.
    async fn check_transient_timeout(
        &mut self,
        ctx: &mut TickContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, OrchestratorError> {
        let Some(entered) = self.data.last_entered else {
            // Records written before this field existed: stamp and wait.
            self.data.last_entered = Some(now);
            self.commit_data(ctx).await?;
            return Ok(Vec::new());
        };
        if now.signed_duration_since(entered) <= ctx.settings.transient_timeout {
            return Ok(Vec::new());
        }

        tracing::warn!(
            uuid = %ctx.cfg.uuid,
            state = self.state.tag(),
            "Transient state timed out"
        );
        match self.state {
            BroadcastState::VidforwardPermanentTransitionLiveToSlate => {
                self.transition(ctx, BroadcastState::VidforwardPermanentSlate)
                    .await?;
                Ok(Vec::new())
            }
            BroadcastState::VidforwardPermanentTransitionSlateToLive => {
                self.transition(ctx, BroadcastState::VidforwardPermanentIdle)
                    .await?;
                Ok(vec![Event::HardwareStopRequest])
            }
            state => {
                // Starting: back to idle, clearing the start bracket.
                let idle = state.idle();
                self.state = idle;
                self.data.last_entered = Some(ctx.now);
                let blob = self.data.to_value();
                ctx.commit(move |cfg| {
                    cfg.apply_state(idle);
                    cfg.state_data = blob;
                    cfg.attempting_to_start = false;
                })
                .await?;
                Ok(vec![Event::HardwareStopRequest])
            }
        }
    }

    // -----------------------------------------------------------------------
    // Start sequence
    // -----------------------------------------------------------------------

    /// Enter the `…Starting` state: create the platform broadcast
    /// (idempotent), bind its handles, prepare the forwarder when in
    /// vidforward mode, and ask the hardware up.
    ///
    /// Any adapter failure leaves the state untouched; the next tick
    /// retries the whole entry.
    async fn enter_starting(
        &mut self,
        ctx: &mut TickContext,
    ) -> Result<Vec<Event>, OrchestratorError> {
        let handles = match ctx.platform.create_broadcast(&ctx.cfg).await {
            Ok(handles) => handles,
            Err(e) => {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Broadcast creation failed; retrying next tick");
                return Ok(Vec::new());
            }
        };
        ctx.commit(move |cfg| {
            cfg.broadcast_id = handles.broadcast_id;
            cfg.stream_id = handles.stream_id;
            cfg.chat_id = handles.chat_id;
            cfg.stream_name = handles.stream_name;
            cfg.rtmp_key = handles.rtmp_key;
        })
        .await?;

        if ctx.cfg.using_vidforward && !ctx.cfg.is_secondary() {
            self.ensure_secondary(ctx).await;
            if let Err(e) = ctx.forwarder.stream(&ctx.cfg).await {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Forwarder stream command failed");
            }
        }

        self.transition(ctx, self.state.starting()).await?;
        Ok(vec![Event::Start, Event::HardwareStartRequest])
    }

    /// Make sure the permanent broadcast's ingest companion exists.
    /// Best-effort: a failure here must not block the start.
    async fn ensure_secondary(&self, ctx: &mut TickContext) {
        let secondary_name = format!("{}{SECONDARY_SUFFIX}", ctx.cfg.name);
        let existing = match ctx.store.list_configs(ctx.site()).await {
            Ok(list) => list.into_iter().any(|c| c.name == secondary_name),
            Err(e) => {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Secondary lookup failed");
                return;
            }
        };
        if existing {
            return;
        }

        let secondary = BroadcastConfig {
            uuid: uuid::Uuid::new_v4(),
            name: secondary_name,
            site_key: ctx.cfg.site_key,
            account: ctx.cfg.account.clone(),
            start: ctx.cfg.start,
            end: ctx.cfg.end,
            enabled: true,
            using_vidforward: true,
            is_secondary: Some(true),
            camera_mac: ctx.cfg.camera_mac.clone(),
            controller_mac: ctx.cfg.controller_mac.clone(),
            resolution: ctx.cfg.resolution.clone(),
            required_streaming_voltage: ctx.cfg.required_streaming_voltage,
            voltage_recovery_timeout: ctx.cfg.voltage_recovery_timeout,
            ..BroadcastConfig::default()
        };
        match ctx.store.put_config(&secondary).await {
            Ok(()) => {
                tracing::info!(uuid = %ctx.cfg.uuid, secondary = %secondary.uuid, "Created secondary broadcast");
            }
            Err(e) => {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Secondary creation failed");
            }
        }
    }

    /// The platform start, fired on `hardwareStarted` while starting.
    ///
    /// `attempting_to_start` commits `false -> true` before the call and
    /// `true -> false` with the outcome, so a crashed tick cannot start
    /// the same session twice.
    async fn attempt_platform_start(
        &mut self,
        ctx: &mut TickContext,
    ) -> Result<Vec<Event>, OrchestratorError> {
        if ctx.cfg.attempting_to_start {
            tracing::warn!(
                uuid = %ctx.cfg.uuid,
                "Platform start already attempted this session; not retrying"
            );
            return Ok(Vec::new());
        }
        ctx.commit(|cfg| cfg.attempting_to_start = true).await?;

        match ctx.platform.start_broadcast(&ctx.cfg).await {
            Ok(()) => {
                ctx.commit(|cfg| cfg.attempting_to_start = false).await?;
                Ok(vec![Event::Started])
            }
            Err(e) => {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Platform start failed");
                ctx.commit(|cfg| cfg.attempting_to_start = false).await?;
                Ok(vec![Event::StartFailed])
            }
        }
    }

    /// `started`: the session is live. Clears the failure counter and
    /// applies the live privacy.
    async fn enter_live(&mut self, ctx: &mut TickContext) -> Result<Vec<Event>, OrchestratorError> {
        let live = self.state.live();
        self.state = live;
        self.data.last_entered = Some(ctx.now);
        let blob = self.data.to_value();
        ctx.commit(move |cfg| {
            cfg.apply_state(live);
            cfg.state_data = blob;
            cfg.start_failures = 0;
        })
        .await?;

        if !ctx.cfg.broadcast_id.is_empty()
            && let Err(e) = ctx
                .platform
                .set_privacy(&ctx.cfg.broadcast_id, ctx.cfg.live_privacy)
                .await
        {
            tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Live privacy change failed");
        }
        Ok(Vec::new())
    }

    /// `startFailed`: back to idle, counting toward disablement. This
    /// handler never publishes `start`.
    async fn on_start_failed(
        &mut self,
        ctx: &mut TickContext,
    ) -> Result<Vec<Event>, OrchestratorError> {
        let max = ctx.settings.max_start_failures;
        let will_disable = ctx.cfg.start_failures.saturating_add(1) >= max;

        let idle = self.state.idle();
        self.state = idle;
        self.data.last_entered = Some(ctx.now);
        let blob = self.data.to_value();
        ctx.commit(move |cfg| {
            cfg.apply_state(idle);
            cfg.state_data = blob;
            let _ = cfg.register_start_failure(max);
        })
        .await?;

        if will_disable {
            tracing::error!(uuid = %ctx.cfg.uuid, "Broadcast disabled after repeated start failures");
            ctx.notify(
                NotifyKind::Broadcast,
                &format!(
                    "broadcast {} disabled after {max} consecutive start failures",
                    ctx.cfg.name
                ),
            )
            .await;
        }
        Ok(Vec::new())
    }

    // -----------------------------------------------------------------------
    // Finish and the slate transitions
    // -----------------------------------------------------------------------

    /// `finish`: permanent broadcasts fall to slate, everything else
    /// stops the platform session and goes idle. The camera is asked
    /// down in both cases.
    async fn on_finish(&mut self, ctx: &mut TickContext) -> Result<Vec<Event>, OrchestratorError> {
        if !self.state.is_live() {
            return Ok(Vec::new());
        }
        match self.state.flavor() {
            Flavor::Permanent => self.enter_live_to_slate(ctx).await,
            Flavor::Secondary | Flavor::Direct => {
                if let Err(e) = ctx.platform.stop_broadcast(&ctx.cfg).await {
                    tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Platform stop failed");
                }
                if !ctx.cfg.broadcast_id.is_empty()
                    && let Err(e) = ctx
                        .platform
                        .set_privacy(&ctx.cfg.broadcast_id, ctx.cfg.post_live_privacy)
                        .await
                {
                    tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Post-live privacy change failed");
                }
                self.transition(ctx, self.state.idle()).await?;
                Ok(vec![Event::HardwareStopRequest])
            }
        }
    }

    /// Command the forwarder onto the slate and begin the live->slate
    /// transition. The forwarder command is best-effort; the unhealthy
    /// `fix` re-issues the mode if it was missed.
    async fn enter_live_to_slate(
        &mut self,
        ctx: &mut TickContext,
    ) -> Result<Vec<Event>, OrchestratorError> {
        if let Err(e) = ctx.forwarder.slate(&ctx.cfg).await {
            tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Forwarder slate command failed");
        }
        self.transition(ctx, BroadcastState::VidforwardPermanentTransitionLiveToSlate)
            .await?;
        Ok(vec![Event::HardwareStopRequest])
    }

    /// Command the forwarder back onto the stream and begin the
    /// slate->live transition. A failed forwarder command leaves the
    /// slate in place for the next tick.
    async fn enter_slate_to_live(
        &mut self,
        ctx: &mut TickContext,
    ) -> Result<Vec<Event>, OrchestratorError> {
        if let Err(e) = ctx.forwarder.stream(&ctx.cfg).await {
            tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Forwarder stream command failed; staying on slate");
            return Ok(Vec::new());
        }
        self.transition(ctx, BroadcastState::VidforwardPermanentTransitionSlateToLive)
            .await?;
        Ok(vec![Event::Start, Event::HardwareStartRequest])
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    /// The unhealthy-state recovery side effect, debounced to once per
    /// reset interval: re-issue the forwarder mode and power-cycle the
    /// camera.
    async fn fix(
        &mut self,
        ctx: &mut TickContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, OrchestratorError> {
        if self
            .data
            .last_reset_attempt
            .is_some_and(|last| now.signed_duration_since(last) < ctx.settings.reset_interval)
        {
            return Ok(Vec::new());
        }
        self.data.last_reset_attempt = Some(now);
        self.commit_data(ctx).await?;

        if ctx.cfg.using_vidforward && !ctx.cfg.is_secondary() {
            let command = if self.state.is_slate() {
                ctx.forwarder.slate(&ctx.cfg).await
            } else {
                ctx.forwarder.stream(&ctx.cfg).await
            };
            if let Err(e) = command {
                tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Forwarder mode re-issue failed");
            }
        }

        tracing::info!(uuid = %ctx.cfg.uuid, state = self.state.tag(), "Unhealthy state recovery attempt");
        ctx.notify(
            NotifyKind::Health,
            &format!("broadcast {} is unhealthy; attempting recovery", ctx.cfg.name),
        )
        .await;
        Ok(vec![Event::HardwareResetRequest])
    }

    /// Emit whichever periodic checks have come due.
    async fn due_checks(
        &mut self,
        ctx: &mut TickContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, OrchestratorError> {
        fn due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: TimeDelta) -> bool {
            last.is_none_or(|t| now.signed_duration_since(t) >= interval)
        }

        let mut raised = Vec::new();
        let mut moved = false;

        if due(self.data.last_status_check, now, ctx.settings.status_interval) {
            raised.push(Event::StatusCheckDue);
            self.data.last_status_check = Some(now);
            moved = true;
        }
        if due(self.data.last_chat_msg, now, ctx.settings.chat_interval) {
            raised.push(Event::ChatMessageDue);
            self.data.last_chat_msg = Some(now);
            moved = true;
        }
        if ctx.cfg.checking_health
            && due(self.data.last_health_check, now, ctx.settings.health_interval)
        {
            raised.push(Event::HealthCheckDue);
            self.data.last_health_check = Some(now);
            moved = true;
        }

        if moved {
            self.commit_data(ctx).await?;
        }
        Ok(raised)
    }
}

#[async_trait]
impl EventHandler for BroadcastMachine {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn handle(
        &mut self,
        ctx: &mut TickContext,
        event: &Event,
    ) -> Result<Vec<Event>, OrchestratorError> {
        match event {
            Event::Time(now) => self.on_time(ctx, *now).await,
            Event::Started if self.state.is_starting() => self.enter_live(ctx).await,
            Event::StartFailed if self.state.is_starting() => self.on_start_failed(ctx).await,
            Event::Finish => self.on_finish(ctx).await,
            Event::BadHealth if !self.state.is_unhealthy() => {
                if self.state.is_live() || self.state.is_slate() {
                    let unhealthy = self.state.unhealthy();
                    self.transition(ctx, unhealthy).await?;
                }
                Ok(Vec::new())
            }
            Event::GoodHealth if self.state.is_unhealthy() => {
                let healthy = self.state.healthy();
                self.transition(ctx, healthy).await?;
                Ok(Vec::new())
            }
            Event::HardwareStarted if self.state.is_starting() => {
                self.attempt_platform_start(ctx).await
            }
            Event::HardwareStarted
                if self.state == BroadcastState::VidforwardPermanentTransitionSlateToLive =>
            {
                self.transition(ctx, BroadcastState::VidforwardPermanentLive)
                    .await?;
                Ok(Vec::new())
            }
            Event::HardwareStopped
                if self.state == BroadcastState::VidforwardPermanentTransitionLiveToSlate =>
            {
                self.transition(ctx, BroadcastState::VidforwardPermanentSlate)
                    .await?;
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }
}
