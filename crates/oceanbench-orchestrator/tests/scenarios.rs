//! End-to-end orchestrator scenarios.
//!
//! Each test drives whole ticks through [`Orchestrator::tick_broadcast`]
//! with the in-memory store and capability fakes, asserting on the
//! published event sequence and the committed record -- the observable
//! surface of the orchestrator.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use oceanbench_adapters::fakes::{FakeForwarder, FakeNotifier, FakePlatform};
use oceanbench_orchestrator::{Orchestrator, OrchestratorSettings};
use oceanbench_store::{device_var, ConfigStore, MemStore, VarRecord, VarStore};
use oceanbench_types::{
    BroadcastConfig, BroadcastState, ForwarderMode, Mac, NotifyKind, SiteKey, StateData,
};

const SITE: SiteKey = SiteKey(3);

struct Fixture {
    store: Arc<MemStore>,
    platform: Arc<FakePlatform>,
    forwarder: Arc<FakeForwarder>,
    notifier: Arc<FakeNotifier>,
    orch: Orchestrator,
}

impl Fixture {
    fn new() -> Self {
        Self::with_settings(OrchestratorSettings::default())
    }

    fn with_settings(settings: OrchestratorSettings) -> Self {
        let store = Arc::new(MemStore::new());
        let platform = Arc::new(FakePlatform::new());
        let forwarder = Arc::new(FakeForwarder::new());
        let notifier = Arc::new(FakeNotifier::new());
        let orch = Orchestrator::new(
            store.clone(),
            store.clone(),
            platform.clone(),
            forwarder.clone(),
            notifier.clone(),
            settings,
        );
        Self {
            store,
            platform,
            forwarder,
            notifier,
            orch,
        }
    }

    async fn put(&self, cfg: &BroadcastConfig) {
        self.store.put_config(cfg).await.unwrap();
    }

    async fn reload(&self, cfg: &BroadcastConfig) -> BroadcastConfig {
        self.store.get_config(SITE, cfg.uuid).await.unwrap()
    }

    /// One tick of one broadcast, returning the published event tags.
    async fn tick(&self, cfg: &BroadcastConfig, now: DateTime<Utc>) -> Vec<String> {
        let loaded = self.reload(cfg).await;
        let outcome = self.orch.tick_broadcast(loaded, now).await.unwrap();
        outcome.events
    }

    async fn mark_camera_alive(&self, mac: &Mac) {
        self.store
            .set_var(SITE, &device_var(mac, "uptime"), "120")
            .await
            .unwrap();
    }

    async fn mark_camera_dead(&self, mac: &Mac) {
        self.store
            .put_var_record(
                SITE,
                &device_var(mac, "uptime"),
                &VarRecord {
                    value: String::from("120"),
                    updated: Utc::now() - TimeDelta::minutes(30),
                },
            )
            .await
            .unwrap();
    }
}

fn camera_mac() -> Mac {
    Mac::parse("AA:BB:CC:00:11:22").unwrap()
}

fn base_config(state: BroadcastState, using_vidforward: bool, secondary: bool) -> BroadcastConfig {
    let mut cfg = BroadcastConfig {
        uuid: uuid::Uuid::new_v4(),
        name: String::from("Rapid Bay"),
        site_key: SITE,
        enabled: true,
        using_vidforward,
        is_secondary: Some(secondary),
        camera_mac: camera_mac(),
        controller_mac: Mac::parse("AA:BB:CC:00:11:33").unwrap(),
        on_actions: String::from("CamPower=true"),
        off_actions: String::from("CamPower=false"),
        ..BroadcastConfig::default()
    };
    cfg.apply_state(state);
    cfg
}

fn scheduled(mut cfg: BroadcastConfig, start: DateTime<Utc>, end: DateTime<Utc>) -> BroadcastConfig {
    cfg.start = Some(start);
    cfg.end = Some(end);
    cfg
}

// ---------------------------------------------------------------------------
// Scenario 1: direct broadcast successful start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_broadcast_successful_start() {
    let fx = Fixture::new();
    let t = Utc::now();
    let cfg = scheduled(
        base_config(BroadcastState::DirectIdle, false, false),
        t,
        t + TimeDelta::hours(1),
    );
    fx.put(&cfg).await;
    fx.mark_camera_alive(&cfg.camera_mac).await;

    // First tick: the start sequence begins and the hardware is asked up.
    let events = fx.tick(&cfg, t + TimeDelta::minutes(1)).await;
    assert_eq!(events, ["time", "start", "hardwareStartRequest", "hardwareStarted", "started"]);

    let after = fx.reload(&cfg).await;
    assert_eq!(after.broadcast_state, "directLive");
    assert_eq!(after.hardware_state, "on");
    assert_eq!(fx.platform.start_count(), 1);
    assert_eq!(
        fx.platform.calls().iter().filter(|c| c.starts_with("create")).count(),
        1
    );
    assert!(!after.attempting_to_start);
}

/// The slow path: the camera takes a tick to come up, so `started`
/// arrives on the second tick, after the liveness probe.
#[tokio::test]
async fn direct_broadcast_start_across_two_ticks() {
    let fx = Fixture::new();
    let t = Utc::now();
    let cfg = scheduled(
        base_config(BroadcastState::DirectIdle, false, false),
        t,
        t + TimeDelta::hours(1),
    );
    fx.put(&cfg).await;
    fx.mark_camera_dead(&cfg.camera_mac).await;

    let events = fx.tick(&cfg, t + TimeDelta::minutes(1)).await;
    assert_eq!(events, ["time", "start", "hardwareStartRequest"]);
    assert_eq!(fx.reload(&cfg).await.broadcast_state, "directStarting");

    fx.mark_camera_alive(&cfg.camera_mac).await;
    let events = fx.tick(&cfg, t + TimeDelta::minutes(2)).await;
    assert_eq!(events, ["time", "hardwareStarted", "started"]);

    let after = fx.reload(&cfg).await;
    assert_eq!(after.broadcast_state, "directLive");
    assert_eq!(after.hardware_state, "on");
    assert_eq!(fx.platform.start_count(), 1);
}

// ---------------------------------------------------------------------------
// Scenario 2: direct broadcast failed hardware start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_broadcast_failed_hardware_start() {
    let fx = Fixture::new();
    let t = Utc::now();
    let cfg = scheduled(
        base_config(BroadcastState::DirectIdle, false, false),
        t,
        t + TimeDelta::hours(1),
    );
    fx.put(&cfg).await;
    fx.mark_camera_dead(&cfg.camera_mac).await;

    let events = fx.tick(&cfg, t + TimeDelta::minutes(1)).await;
    assert_eq!(events, ["time", "start", "hardwareStartRequest"]);

    // Camera still unhealthy on the next tick: nothing moves.
    let events = fx.tick(&cfg, t + TimeDelta::minutes(2)).await;
    assert_eq!(events, ["time"]);

    let after = fx.reload(&cfg).await;
    assert_eq!(after.broadcast_state, "directStarting");
    assert_eq!(fx.platform.start_count(), 0);
}

// ---------------------------------------------------------------------------
// Scenario 3: permanent broadcast end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn permanent_broadcast_end_falls_to_slate_transition() {
    let fx = Fixture::new();
    let t = Utc::now() - TimeDelta::hours(2);
    let cfg = scheduled(
        base_config(BroadcastState::VidforwardPermanentLive, true, false),
        t,
        t + TimeDelta::hours(1),
    );
    fx.put(&cfg).await;

    let events = fx.tick(&cfg, Utc::now()).await;
    assert_eq!(events, ["time", "finish", "hardwareStopRequest"]);

    let after = fx.reload(&cfg).await;
    assert_eq!(
        after.broadcast_state,
        "vidforwardPermanentTransitionLiveToSlate"
    );
    assert_eq!(fx.forwarder.last_mode(), Some(ForwarderMode::Slate));
    // The permanent platform broadcast is never stopped.
    assert!(!fx.platform.calls().iter().any(|c| c.starts_with("stop")));
}

/// The transition completes once the hardware reports off.
#[tokio::test]
async fn live_to_slate_transition_completes_on_hardware_stop() {
    let fx = Fixture::new();
    let t = Utc::now() - TimeDelta::hours(2);
    let mut cfg = scheduled(
        base_config(BroadcastState::VidforwardPermanentLive, true, false),
        t,
        t + TimeDelta::hours(1),
    );
    cfg.hardware_state = String::from("on");
    fx.put(&cfg).await;
    fx.mark_camera_alive(&cfg.camera_mac).await;

    let events = fx.tick(&cfg, Utc::now()).await;
    assert_eq!(events, ["time", "finish", "hardwareStopRequest"]);
    assert_eq!(fx.reload(&cfg).await.hardware_state, "stopping");

    // Camera powers down; the probe goes stale; slate becomes terminal.
    fx.mark_camera_dead(&cfg.camera_mac).await;
    let events = fx.tick(&cfg, Utc::now()).await;
    assert_eq!(events, ["time", "hardwareStopped"]);

    let after = fx.reload(&cfg).await;
    assert_eq!(after.broadcast_state, "vidforwardPermanentSlate");
    assert_eq!(after.hardware_state, "off");
}

// ---------------------------------------------------------------------------
// Scenario 4: secondary before-start no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn secondary_before_start_is_a_no_op() {
    let fx = Fixture::new();
    let t = Utc::now() + TimeDelta::minutes(10);
    let cfg = scheduled(
        base_config(BroadcastState::VidforwardSecondaryIdle, true, true),
        t,
        t + TimeDelta::hours(1),
    );
    fx.put(&cfg).await;
    let before = fx.reload(&cfg).await;
    let writes = fx.store.write_count();

    let events = fx.tick(&cfg, Utc::now()).await;
    assert_eq!(events, ["time"]);

    // Byte-for-byte unchanged: no commit happened at all.
    let after = fx.reload(&cfg).await;
    assert_eq!(before, after);
    assert_eq!(fx.store.write_count(), writes);
}

// ---------------------------------------------------------------------------
// Scenario 5: unhealthy live debounce
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unhealthy_fix_is_debounced_to_the_reset_interval() {
    let fx = Fixture::new();
    let now = Utc::now();

    let mut cfg = base_config(BroadcastState::VidforwardPermanentLiveUnhealthy, true, false);
    cfg.set_state_data(&StateData {
        last_reset_attempt: Some(now - TimeDelta::minutes(4)),
        ..StateData::default()
    });
    fx.put(&cfg).await;

    // Four minutes since the last attempt: inside the debounce window.
    let events = fx.tick(&cfg, now).await;
    assert_eq!(events, ["time"]);
    assert!(fx.notifier.notes().is_empty());

    // Six minutes since: one recovery attempt fires.
    let mut cfg2 = base_config(BroadcastState::VidforwardPermanentLiveUnhealthy, true, false);
    cfg2.set_state_data(&StateData {
        last_reset_attempt: Some(now - TimeDelta::minutes(6)),
        ..StateData::default()
    });
    fx.put(&cfg2).await;

    let events = fx.tick(&cfg2, now).await;
    assert_eq!(events, ["time", "hardwareResetRequest"]);
    // The live forwarder mode is re-issued and operations is told.
    assert_eq!(fx.forwarder.last_mode(), Some(ForwarderMode::Stream));
    assert_eq!(fx.notifier.count_of(NotifyKind::Health), 1);

    // Still unhealthy, but the attempt is stamped.
    let after = fx.reload(&cfg2).await;
    assert_eq!(after.broadcast_state, "vidforwardPermanentLiveUnhealthy");
    assert_eq!(after.state_data().last_reset_attempt, Some(now));
}

// ---------------------------------------------------------------------------
// Scenario 6: starting timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn starting_timeout_reverts_to_idle() {
    let fx = Fixture::new();
    let t = Utc::now() - TimeDelta::minutes(6);

    let mut cfg = scheduled(
        base_config(BroadcastState::VidforwardPermanentStarting, true, false),
        t - TimeDelta::minutes(1),
        t + TimeDelta::hours(1),
    );
    cfg.set_state_data(&StateData {
        last_entered: Some(t),
        ..StateData::default()
    });
    fx.put(&cfg).await;

    let events = fx.tick(&cfg, Utc::now()).await;
    assert_eq!(events, ["time", "hardwareStopRequest"]);

    let after = fx.reload(&cfg).await;
    assert_eq!(after.broadcast_state, "vidforwardPermanentIdle");
    assert!(!after.attempting_to_start);
}

#[tokio::test]
async fn transition_timeouts_diverge_by_direction() {
    let fx = Fixture::new();
    let entered = Utc::now() - TimeDelta::minutes(6);

    // live -> slate falls forward to the slate terminal.
    let mut cfg = base_config(
        BroadcastState::VidforwardPermanentTransitionLiveToSlate,
        true,
        false,
    );
    cfg.set_state_data(&StateData {
        last_entered: Some(entered),
        ..StateData::default()
    });
    fx.put(&cfg).await;
    fx.tick(&cfg, Utc::now()).await;
    assert_eq!(fx.reload(&cfg).await.broadcast_state, "vidforwardPermanentSlate");

    // slate -> live reverts to idle so the next tick retries in full.
    let mut cfg = base_config(
        BroadcastState::VidforwardPermanentTransitionSlateToLive,
        true,
        false,
    );
    cfg.set_state_data(&StateData {
        last_entered: Some(entered),
        ..StateData::default()
    });
    fx.put(&cfg).await;
    let events = fx.tick(&cfg, Utc::now()).await;
    assert!(events.contains(&String::from("hardwareStopRequest")));
    assert_eq!(fx.reload(&cfg).await.broadcast_state, "vidforwardPermanentIdle");
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// An idle broadcast with nothing to do commits nothing: one tick leaves
/// the record byte-equal.
#[tokio::test]
async fn idle_tick_is_idempotent() {
    let fx = Fixture::new();
    let cfg = base_config(BroadcastState::DirectIdle, false, false);
    fx.put(&cfg).await;
    let before = fx.reload(&cfg).await;
    let writes = fx.store.write_count();

    fx.tick(&cfg, Utc::now()).await;

    assert_eq!(fx.reload(&cfg).await, before);
    assert_eq!(fx.store.write_count(), writes);
}

/// The committed `attempting_to_start` bracket blocks a second platform
/// start within the same session, even across a crashed tick.
#[tokio::test]
async fn at_most_one_platform_start_per_session() {
    let fx = Fixture::new();
    let t = Utc::now();
    let mut cfg = scheduled(
        base_config(BroadcastState::DirectStarting, false, false),
        t - TimeDelta::minutes(1),
        t + TimeDelta::hours(1),
    );
    cfg.set_state_data(&StateData {
        last_entered: Some(t),
        ..StateData::default()
    });
    // A previous tick crashed mid-start: the bracket is still held.
    cfg.attempting_to_start = true;
    cfg.hardware_state = String::from("starting");
    fx.put(&cfg).await;
    fx.mark_camera_alive(&cfg.camera_mac).await;

    let events = fx.tick(&cfg, t).await;
    assert_eq!(events, ["time", "hardwareStarted"]);
    assert_eq!(fx.platform.start_count(), 0);
}

/// Three consecutive platform start failures disable the broadcast and
/// clear the counter.
#[tokio::test]
async fn repeated_start_failures_disable_the_broadcast() {
    let fx = Fixture::new();
    fx.platform.set_fail_start(true);
    let t = Utc::now();
    let cfg = scheduled(
        base_config(BroadcastState::DirectIdle, false, false),
        t,
        t + TimeDelta::hours(2),
    );
    fx.put(&cfg).await;
    fx.mark_camera_alive(&cfg.camera_mac).await;

    for round in 1..=3 {
        let now = t + TimeDelta::minutes(round);
        let events = fx.tick(&cfg, now).await;
        assert!(events.contains(&String::from("startFailed")), "round {round}");
    }

    let after = fx.reload(&cfg).await;
    assert!(!after.enabled);
    assert_eq!(after.start_failures, 0);
    assert_eq!(after.broadcast_state, "directIdle");
    assert_eq!(fx.notifier.count_of(NotifyKind::Broadcast), 1);
    assert_eq!(fx.platform.start_count(), 3);
}

/// Events spilled past the tick deadline land in the redelivery queue
/// ahead of the next `time`, and are consumed before it.
#[tokio::test]
async fn spilled_events_replay_ahead_of_time() {
    // A zero tick budget cancels the context before the first publish.
    let mut settings = OrchestratorSettings::default();
    settings.tick_budget = std::time::Duration::ZERO;
    let fx = Fixture::with_settings(settings);

    let t = Utc::now();
    let mut cfg = scheduled(
        base_config(BroadcastState::DirectStarting, false, false),
        t - TimeDelta::minutes(1),
        t + TimeDelta::hours(1),
    );
    cfg.set_state_data(&StateData {
        last_entered: Some(t),
        ..StateData::default()
    });
    cfg.events = vec![String::from("started")];
    fx.put(&cfg).await;

    let events = fx.tick(&cfg, t).await;
    assert!(events.is_empty());
    // The queued event re-spilled ahead of the spilled time event.
    assert_eq!(fx.reload(&cfg).await.events, ["started", "time"]);

    // A healthy tick consumes the queue ahead of the new time event.
    let fx2 = Fixture::new();
    fx2.put(&fx.reload(&cfg).await).await;
    let events = fx2.tick(&cfg, t + TimeDelta::minutes(1)).await;
    assert_eq!(events.first().map(String::as_str), Some("started"));
    assert_eq!(fx2.reload(&cfg).await.broadcast_state, "directLive");
    assert!(fx2.reload(&cfg).await.events.is_empty());
}

/// Unknown queued tags are dropped with a log line, not an error.
#[tokio::test]
async fn unknown_queued_tags_are_dropped() {
    let fx = Fixture::new();
    let mut cfg = base_config(BroadcastState::DirectIdle, false, false);
    cfg.events = vec![String::from("hardwareExploded")];
    fx.put(&cfg).await;

    let events = fx.tick(&cfg, Utc::now()).await;
    assert_eq!(events, ["time"]);
    assert!(fx.reload(&cfg).await.events.is_empty());
}

/// A config whose flags do not map to any state is skipped without
/// mutation.
#[tokio::test]
async fn corrupt_projection_is_skipped_without_mutation() {
    let fx = Fixture::new();
    let mut cfg = base_config(BroadcastState::DirectIdle, false, false);
    cfg.slate = true; // direct broadcasts cannot slate
    fx.put(&cfg).await;
    let writes = fx.store.write_count();

    let loaded = fx.reload(&cfg).await;
    let err = fx.orch.tick_broadcast(loaded, Utc::now()).await.unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(fx.store.write_count(), writes);
}

/// A permanent broadcast on slate inside its window heads back to live
/// through the slate-to-live transition.
#[tokio::test]
async fn slate_inside_window_transitions_back_to_live() {
    let fx = Fixture::new();
    let t = Utc::now();
    let cfg = scheduled(
        base_config(BroadcastState::VidforwardPermanentSlate, true, false),
        t - TimeDelta::minutes(5),
        t + TimeDelta::hours(1),
    );
    fx.put(&cfg).await;

    let events = fx.tick(&cfg, t).await;
    assert_eq!(events, ["time", "start", "hardwareStartRequest"]);
    assert_eq!(
        fx.reload(&cfg).await.broadcast_state,
        "vidforwardPermanentTransitionSlateToLive"
    );
    assert_eq!(fx.forwarder.last_mode(), Some(ForwarderMode::Stream));
}

/// Starting a permanent broadcast provisions its secondary companion.
#[tokio::test]
async fn permanent_start_ensures_the_secondary_exists() {
    let fx = Fixture::new();
    let t = Utc::now();
    let cfg = scheduled(
        base_config(BroadcastState::VidforwardPermanentIdle, true, false),
        t,
        t + TimeDelta::hours(1),
    );
    fx.put(&cfg).await;
    fx.mark_camera_dead(&cfg.camera_mac).await;

    fx.tick(&cfg, t + TimeDelta::minutes(1)).await;

    let all = fx.store.list_configs(SITE).await.unwrap();
    assert_eq!(all.len(), 2);
    let secondary = all.iter().find(|c| c.uuid != cfg.uuid).unwrap();
    assert_eq!(secondary.name, "Rapid Bay@secondary");
    assert_eq!(secondary.is_secondary, Some(true));

    // A second start does not create a duplicate.
    fx.tick(&cfg, t + TimeDelta::minutes(2)).await;
    assert_eq!(fx.store.list_configs(SITE).await.unwrap().len(), 2);
}
