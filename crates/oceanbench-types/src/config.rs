//! The durable broadcast configuration record.
//!
//! One [`BroadcastConfig`] is the single source of truth for a broadcast.
//! It is persisted as a JSON blob keyed `"<site>:Broadcast.<uuid>"` and
//! mutated only through the store's transactional read-modify-write. The
//! orchestrator holds a per-tick snapshot; the durable projection of the
//! two state machines lives in the `broadcast_state`/`hardware_state` tags,
//! the boolean projection flags, and the opaque state-data blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::enums::{BroadcastState, NotifyKind, Privacy};
use crate::ids::{Mac, SiteKey};
use crate::projection::StateProjection;

/// Name suffix marking a secondary broadcast, the ingest companion of a
/// permanent one.
pub const SECONDARY_SUFFIX: &str = "@secondary";

/// Datastore key for a broadcast config record.
pub fn broadcast_key(site: SiteKey, uuid: Uuid) -> String {
    format!("{site}:Broadcast.{uuid}")
}

/// The durable configuration and observed state of one broadcast.
///
/// Fields fall into identity, schedule, mode, platform binding, hardware
/// binding, observed state, recovery policy, and notification policy.
/// Every field carries a serde default so records written by older
/// revisions rehydrate cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
#[validate(schema(function = validate_schedule))]
pub struct BroadcastConfig {
    // --- Identity ---
    /// Immutable broadcast identity.
    pub uuid: Uuid,
    /// Human-readable broadcast name.
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Owning site.
    pub site_key: SiteKey,
    /// Platform account identity the broadcast is created under.
    pub account: String,

    // --- Schedule ---
    /// Scheduled session start.
    pub start: Option<DateTime<Utc>>,
    /// Scheduled session end.
    pub end: Option<DateTime<Utc>>,
    /// Disabled broadcasts are skipped entirely by the tick driver.
    pub enabled: bool,
    /// Whether the health handler probes the platform for this broadcast.
    pub checking_health: bool,

    // --- Mode ---
    /// Long-lived slate-capable mode behind the forwarder, vs a direct
    /// short broadcast.
    pub using_vidforward: bool,
    /// Explicit secondary marker. `None` on records predating the field;
    /// derived once from the name suffix and committed.
    pub is_secondary: Option<bool>,

    // --- Platform binding ---
    /// Platform broadcast object ID.
    pub broadcast_id: String,
    /// Platform ingest stream ID.
    pub stream_id: String,
    /// Platform live-chat ID.
    pub chat_id: String,
    /// Platform stream name/key label.
    pub stream_name: String,
    /// RTMP ingest key.
    pub rtmp_key: String,
    /// Privacy while live.
    pub live_privacy: Privacy,
    /// Privacy applied when the session finishes.
    pub post_live_privacy: Privacy,
    /// Requested video resolution (for example `1080p`).
    pub resolution: String,
    /// Broadcast description shown on the platform.
    pub description: String,

    // --- Hardware binding ---
    /// MAC of the camera.
    pub camera_mac: Mac,
    /// MAC of the rig controller (battery voltage source).
    pub controller_mac: Mac,
    /// Comma-separated `var=value` writes that power the camera on.
    pub on_actions: String,
    /// Comma-separated `var=value` writes that power the camera off.
    pub off_actions: String,
    /// Comma-separated `var=value` writes for a full rig shutdown.
    pub shutdown_actions: String,
    /// Device variable that receives the RTMP endpoint for direct mode.
    pub rtmp_var: String,

    // --- Observed state ---
    /// Committed broadcast state tag (see
    /// [`BroadcastState`]). Empty on a fresh record.
    pub broadcast_state: String,
    /// Committed hardware state tag. Empty on a fresh record.
    pub hardware_state: String,
    /// Opaque state-private fields of the broadcast machine.
    pub state_data: Value,
    /// Opaque state-private fields of the hardware machine.
    pub hardware_state_data: Value,
    /// Projection flag: a session is underway (live, slate, transition).
    pub active: bool,
    /// Projection flag: the forwarder is emitting the slate.
    pub slate: bool,
    /// Projection flag: the start sequence is underway.
    pub starting: bool,
    /// Projection flag: moving between live and slate.
    pub transitioning: bool,
    /// Projection flag: health probes are failing.
    pub unhealthy: bool,
    /// Bracket around the platform start call; commits `false -> true`
    /// before the call and `true -> false` with its outcome.
    pub attempting_to_start: bool,
    /// Hardware has been declared failed.
    pub in_failure: bool,
    /// Successive health-probe failures.
    pub issues: u32,
    /// Successive start failures; reaching the limit disables the
    /// broadcast and clears the counter.
    pub start_failures: u32,
    /// Waiting for battery voltage to reach streaming level.
    pub recovering_voltage: bool,
    /// Event tags queued for redelivery on the next tick (FIFO).
    pub events: Vec<String>,

    // --- Recovery policy ---
    /// Minimum battery voltage required to start streaming.
    pub required_streaming_voltage: f64,
    /// Seconds allowed for voltage recovery before declaring failure.
    pub voltage_recovery_timeout: u64,

    // --- Notifications ---
    /// Notification kinds suppressed for this broadcast.
    pub notify_suppress_rules: Vec<NotifyKind>,

    /// Sensors whose latest scalar is posted to the live chat.
    pub sensors: Vec<SensorEntry>,

    /// Set on every committed mutation. Ignored by byte-equality checks.
    pub updated: DateTime<Utc>,
}

/// Schema-level schedule sanity: `end` must be after `start` when both set.
fn validate_schedule(cfg: &BroadcastConfig) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (cfg.start, cfg.end)
        && end <= start
    {
        return Err(ValidationError::new("end_not_after_start"));
    }
    Ok(())
}

impl BroadcastConfig {
    /// Datastore key of this record.
    pub fn key(&self) -> String {
        broadcast_key(self.site_key, self.uuid)
    }

    /// True when `start <= now <= end`. A broadcast without a full
    /// schedule is never inside its window.
    pub fn within_window(&self, now: DateTime<Utc>) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= now && now <= end,
            _ => false,
        }
    }

    /// True strictly before the scheduled start.
    pub fn before_window(&self, now: DateTime<Utc>) -> bool {
        self.start.is_some_and(|start| now < start)
    }

    /// True strictly after the scheduled end.
    pub fn after_window(&self, now: DateTime<Utc>) -> bool {
        self.end.is_some_and(|end| now > end)
    }

    /// Whether this broadcast is a secondary: the explicit field when
    /// committed, the name suffix otherwise.
    pub fn is_secondary(&self) -> bool {
        self.is_secondary
            .unwrap_or_else(|| self.name.ends_with(SECONDARY_SUFFIX))
    }

    /// Promote the name-suffix convention into the explicit field.
    ///
    /// Returns true when the field was newly set and therefore needs a
    /// commit.
    pub fn promote_secondary_flag(&mut self) -> bool {
        if self.is_secondary.is_some() {
            return false;
        }
        self.is_secondary = Some(self.name.ends_with(SECONDARY_SUFFIX));
        true
    }

    /// Record one more start failure.
    ///
    /// At `max` consecutive failures the broadcast is disabled and the
    /// counter cleared; returns true in exactly that case so the caller
    /// can notify operations once per disablement.
    pub fn register_start_failure(&mut self, max: u32) -> bool {
        self.start_failures = self.start_failures.saturating_add(1);
        if self.start_failures >= max {
            self.start_failures = 0;
            self.enabled = false;
            return true;
        }
        false
    }

    /// Enable or disable the broadcast. Re-enabling clears the start
    /// failure counter: a re-enabled broadcast starts with a clean slate.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.start_failures = 0;
        }
        self.enabled = enabled;
    }

    /// The projection tuple of the committed flags.
    pub fn projection(&self) -> StateProjection {
        StateProjection {
            using_vidforward: self.using_vidforward,
            is_secondary: self.is_secondary(),
            active: self.active,
            slate: self.slate,
            starting: self.starting,
            unhealthy: self.unhealthy,
            transitioning: self.transitioning,
        }
    }

    /// Commit a broadcast state: writes the tag and every projection flag
    /// it implies, so tag and tuple can never diverge within one commit.
    pub fn apply_state(&mut self, state: BroadcastState) {
        let p = StateProjection::from_state(state);
        self.broadcast_state = state.tag().to_owned();
        self.active = p.active;
        self.slate = p.slate;
        self.starting = p.starting;
        self.unhealthy = p.unhealthy;
        self.transitioning = p.transitioning;
    }

    /// Typed view of the broadcast machine's state-private blob.
    pub fn state_data(&self) -> StateData {
        StateData::from_value(&self.state_data)
    }

    /// Write back the broadcast machine's state-private blob.
    pub fn set_state_data(&mut self, data: &StateData) {
        self.state_data = data.to_value();
    }

    /// Typed view of the hardware machine's state-private blob.
    pub fn hardware_data(&self) -> HardwareStateData {
        HardwareStateData::from_value(&self.hardware_state_data)
    }

    /// Write back the hardware machine's state-private blob.
    pub fn set_hardware_data(&mut self, data: &HardwareStateData) {
        self.hardware_state_data = data.to_value();
    }
}

/// State-private fields of the broadcast machine, persisted as an opaque
/// JSON blob alongside the state tag.
///
/// Absent fields deserialise to `None` so older records rehydrate cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StateData {
    /// When the current state was entered.
    pub last_entered: Option<DateTime<Utc>>,
    /// Last unhealthy-state recovery attempt (debounces `fix()`).
    pub last_reset_attempt: Option<DateTime<Utc>>,
    /// Last `healthCheckDue` published.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Last `statusCheckDue` published.
    pub last_status_check: Option<DateTime<Utc>>,
    /// Last `chatMessageDue` published.
    pub last_chat_msg: Option<DateTime<Utc>>,
}

impl StateData {
    /// Deserialise from the opaque blob, tolerating absent fields and a
    /// null blob.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Serialise into the opaque blob.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// State-private fields of the hardware machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HardwareStateData {
    /// When the current hardware state was entered.
    pub last_entered: Option<DateTime<Utc>>,
    /// When voltage recovery began, if underway.
    pub voltage_recovery_started: Option<DateTime<Utc>>,
}

impl HardwareStateData {
    /// Deserialise from the opaque blob, tolerating absent fields and a
    /// null blob.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Serialise into the opaque blob.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A sensor whose latest reading is included in the aggregated chat
/// message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SensorEntry {
    /// Display name used in the chat message.
    pub name: String,
    /// Device pin the scalar is read from.
    pub pin: String,
    /// Units suffix for the chat message.
    pub units: String,
    /// Whether this sensor participates in chat messages.
    pub send_msg: bool,
    /// Linear transform applied to the raw scalar: `value * scale + offset`.
    pub scale_factor: f64,
    /// Linear transform offset.
    pub offset: f64,
}

impl SensorEntry {
    /// Apply the sensor's linear transform to a raw reading.
    pub fn transform(&self, raw: f64) -> f64 {
        let scale = if self.scale_factor == 0.0 {
            1.0
        } else {
            self.scale_factor
        };
        raw.mul_add(scale, self.offset)
    }
}
