//! Enumeration types for the broadcast orchestrator.
//!
//! The broadcast state set multiplexes three flavours of session over one
//! vocabulary: *permanent* vidforward broadcasts (long-lived, slate-capable),
//! *secondary* broadcasts (the short-lived RTMP ingest companion of a
//! permanent one), and *direct* broadcasts (camera straight to the
//! platform). The string tag of each state is stable: it is what gets
//! committed into the durable record and what rehydration parses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Broadcast states
// ---------------------------------------------------------------------------

/// Canonical broadcast lifecycle states.
///
/// Exactly one of these tags is committed on a config at any time, and the
/// boolean projection flags on the config map bijectively onto it (see
/// [`StateProjection`](crate::projection::StateProjection)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastState {
    /// Permanent broadcast with no session underway.
    VidforwardPermanentIdle,
    /// Permanent broadcast performing its start sequence.
    VidforwardPermanentStarting,
    /// Permanent broadcast live from the camera.
    VidforwardPermanentLive,
    /// Permanent broadcast live but failing health probes.
    VidforwardPermanentLiveUnhealthy,
    /// Permanent broadcast emitting the slate image.
    VidforwardPermanentSlate,
    /// Permanent broadcast on slate and failing health probes.
    VidforwardPermanentSlateUnhealthy,
    /// Permanent broadcast moving live -> slate (hardware shutting down).
    VidforwardPermanentTransitionLiveToSlate,
    /// Permanent broadcast moving slate -> live (hardware starting).
    VidforwardPermanentTransitionSlateToLive,
    /// Secondary broadcast with no session underway.
    VidforwardSecondaryIdle,
    /// Secondary broadcast performing its start sequence.
    VidforwardSecondaryStarting,
    /// Secondary broadcast live.
    VidforwardSecondaryLive,
    /// Secondary broadcast live but failing health probes.
    VidforwardSecondaryLiveUnhealthy,
    /// Direct broadcast with no session underway.
    DirectIdle,
    /// Direct broadcast performing its start sequence.
    DirectStarting,
    /// Direct broadcast live.
    DirectLive,
    /// Direct broadcast live but failing health probes.
    DirectLiveUnhealthy,
}

/// The three session flavours multiplexed over the broadcast state set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// Long-lived slate-capable broadcast behind the forwarder.
    Permanent,
    /// Short-lived ingest companion of a permanent broadcast.
    Secondary,
    /// Camera straight to the platform, no forwarder.
    Direct,
}

impl BroadcastState {
    /// The stable string tag committed into the durable record.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::VidforwardPermanentIdle => "vidforwardPermanentIdle",
            Self::VidforwardPermanentStarting => "vidforwardPermanentStarting",
            Self::VidforwardPermanentLive => "vidforwardPermanentLive",
            Self::VidforwardPermanentLiveUnhealthy => "vidforwardPermanentLiveUnhealthy",
            Self::VidforwardPermanentSlate => "vidforwardPermanentSlate",
            Self::VidforwardPermanentSlateUnhealthy => "vidforwardPermanentSlateUnhealthy",
            Self::VidforwardPermanentTransitionLiveToSlate => {
                "vidforwardPermanentTransitionLiveToSlate"
            }
            Self::VidforwardPermanentTransitionSlateToLive => {
                "vidforwardPermanentTransitionSlateToLive"
            }
            Self::VidforwardSecondaryIdle => "vidforwardSecondaryIdle",
            Self::VidforwardSecondaryStarting => "vidforwardSecondaryStarting",
            Self::VidforwardSecondaryLive => "vidforwardSecondaryLive",
            Self::VidforwardSecondaryLiveUnhealthy => "vidforwardSecondaryLiveUnhealthy",
            Self::DirectIdle => "directIdle",
            Self::DirectStarting => "directStarting",
            Self::DirectLive => "directLive",
            Self::DirectLiveUnhealthy => "directLiveUnhealthy",
        }
    }

    /// Parse a stored tag back into a state.
    pub fn from_tag(tag: &str) -> Option<Self> {
        ALL_BROADCAST_STATES.iter().copied().find(|s| s.tag() == tag)
    }

    /// Which session flavour this state belongs to.
    pub const fn flavor(self) -> Flavor {
        match self {
            Self::VidforwardPermanentIdle
            | Self::VidforwardPermanentStarting
            | Self::VidforwardPermanentLive
            | Self::VidforwardPermanentLiveUnhealthy
            | Self::VidforwardPermanentSlate
            | Self::VidforwardPermanentSlateUnhealthy
            | Self::VidforwardPermanentTransitionLiveToSlate
            | Self::VidforwardPermanentTransitionSlateToLive => Flavor::Permanent,
            Self::VidforwardSecondaryIdle
            | Self::VidforwardSecondaryStarting
            | Self::VidforwardSecondaryLive
            | Self::VidforwardSecondaryLiveUnhealthy => Flavor::Secondary,
            Self::DirectIdle
            | Self::DirectStarting
            | Self::DirectLive
            | Self::DirectLiveUnhealthy => Flavor::Direct,
        }
    }

    /// True for the `…Idle` states.
    pub const fn is_idle(self) -> bool {
        matches!(
            self,
            Self::VidforwardPermanentIdle | Self::VidforwardSecondaryIdle | Self::DirectIdle
        )
    }

    /// True for the `…Starting` states.
    pub const fn is_starting(self) -> bool {
        matches!(
            self,
            Self::VidforwardPermanentStarting
                | Self::VidforwardSecondaryStarting
                | Self::DirectStarting
        )
    }

    /// True for the live states, healthy or not.
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::VidforwardPermanentLive
                | Self::VidforwardPermanentLiveUnhealthy
                | Self::VidforwardSecondaryLive
                | Self::VidforwardSecondaryLiveUnhealthy
                | Self::DirectLive
                | Self::DirectLiveUnhealthy
        )
    }

    /// True for the slate states, healthy or not.
    pub const fn is_slate(self) -> bool {
        matches!(
            self,
            Self::VidforwardPermanentSlate | Self::VidforwardPermanentSlateUnhealthy
        )
    }

    /// True for the unhealthy variants.
    pub const fn is_unhealthy(self) -> bool {
        matches!(
            self,
            Self::VidforwardPermanentLiveUnhealthy
                | Self::VidforwardPermanentSlateUnhealthy
                | Self::VidforwardSecondaryLiveUnhealthy
                | Self::DirectLiveUnhealthy
        )
    }

    /// True for the two permanent transition states.
    pub const fn is_transitioning(self) -> bool {
        matches!(
            self,
            Self::VidforwardPermanentTransitionLiveToSlate
                | Self::VidforwardPermanentTransitionSlateToLive
        )
    }

    /// The `…Idle` state of this state's flavour.
    pub const fn idle(self) -> Self {
        match self.flavor() {
            Flavor::Permanent => Self::VidforwardPermanentIdle,
            Flavor::Secondary => Self::VidforwardSecondaryIdle,
            Flavor::Direct => Self::DirectIdle,
        }
    }

    /// The `…Starting` state of this state's flavour.
    pub const fn starting(self) -> Self {
        match self.flavor() {
            Flavor::Permanent => Self::VidforwardPermanentStarting,
            Flavor::Secondary => Self::VidforwardSecondaryStarting,
            Flavor::Direct => Self::DirectStarting,
        }
    }

    /// The healthy live state of this state's flavour.
    pub const fn live(self) -> Self {
        match self.flavor() {
            Flavor::Permanent => Self::VidforwardPermanentLive,
            Flavor::Secondary => Self::VidforwardSecondaryLive,
            Flavor::Direct => Self::DirectLive,
        }
    }

    /// The unhealthy counterpart of a live or slate state.
    ///
    /// Identity for states with no unhealthy variant.
    pub const fn unhealthy(self) -> Self {
        match self {
            Self::VidforwardPermanentLive => Self::VidforwardPermanentLiveUnhealthy,
            Self::VidforwardPermanentSlate => Self::VidforwardPermanentSlateUnhealthy,
            Self::VidforwardSecondaryLive => Self::VidforwardSecondaryLiveUnhealthy,
            Self::DirectLive => Self::DirectLiveUnhealthy,
            other => other,
        }
    }

    /// The healthy counterpart of an unhealthy state.
    ///
    /// Identity for states that are already healthy.
    pub const fn healthy(self) -> Self {
        match self {
            Self::VidforwardPermanentLiveUnhealthy => Self::VidforwardPermanentLive,
            Self::VidforwardPermanentSlateUnhealthy => Self::VidforwardPermanentSlate,
            Self::VidforwardSecondaryLiveUnhealthy => Self::VidforwardSecondaryLive,
            Self::DirectLiveUnhealthy => Self::DirectLive,
            other => other,
        }
    }

    /// Where a live state lands when its session finishes: permanent
    /// broadcasts fall to the live->slate transition, everything else
    /// goes idle.
    pub const fn finish_target(self) -> Self {
        match self.flavor() {
            Flavor::Permanent => Self::VidforwardPermanentTransitionLiveToSlate,
            Flavor::Secondary => Self::VidforwardSecondaryIdle,
            Flavor::Direct => Self::DirectIdle,
        }
    }
}

/// Every canonical broadcast state, in projection-table order.
pub const ALL_BROADCAST_STATES: [BroadcastState; 16] = [
    BroadcastState::VidforwardPermanentIdle,
    BroadcastState::VidforwardPermanentStarting,
    BroadcastState::VidforwardPermanentLive,
    BroadcastState::VidforwardPermanentLiveUnhealthy,
    BroadcastState::VidforwardPermanentTransitionLiveToSlate,
    BroadcastState::VidforwardPermanentSlate,
    BroadcastState::VidforwardPermanentSlateUnhealthy,
    BroadcastState::VidforwardPermanentTransitionSlateToLive,
    BroadcastState::VidforwardSecondaryIdle,
    BroadcastState::VidforwardSecondaryStarting,
    BroadcastState::VidforwardSecondaryLive,
    BroadcastState::VidforwardSecondaryLiveUnhealthy,
    BroadcastState::DirectIdle,
    BroadcastState::DirectStarting,
    BroadcastState::DirectLive,
    BroadcastState::DirectLiveUnhealthy,
];

impl fmt::Display for BroadcastState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for BroadcastState {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| UnknownTag(s.to_owned()))
    }
}

/// A stored state tag that does not name any known state.
#[derive(Debug, thiserror::Error)]
#[error("unknown state tag: {0:?}")]
pub struct UnknownTag(pub String);

// ---------------------------------------------------------------------------
// Hardware states
// ---------------------------------------------------------------------------

/// Camera rig lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HardwareState {
    /// Camera powered down.
    #[default]
    Off,
    /// Power-on actions written, waiting for the uptime probe.
    Starting,
    /// Camera alive and streaming.
    On,
    /// Power-off actions written, waiting for the uptime probe to go stale.
    Stopping,
    /// Stop issued ahead of a fresh start (recovery path).
    Restarting,
    /// Hardware declared failed (for example voltage recovery timed out).
    Failure,
}

impl HardwareState {
    /// The stable string tag committed into the durable record.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Starting => "starting",
            Self::On => "on",
            Self::Stopping => "stopping",
            Self::Restarting => "restarting",
            Self::Failure => "failure",
        }
    }

    /// Parse a stored tag back into a state.
    pub fn from_tag(tag: &str) -> Option<Self> {
        [
            Self::Off,
            Self::Starting,
            Self::On,
            Self::Stopping,
            Self::Restarting,
            Self::Failure,
        ]
        .into_iter()
        .find(|s| s.tag() == tag)
    }
}

impl fmt::Display for HardwareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// Platform-facing enums
// ---------------------------------------------------------------------------

/// Privacy setting of a platform broadcast object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    /// Visible to anyone.
    Public,
    /// Reachable by link only.
    #[default]
    Unlisted,
    /// Visible to the account only.
    Private,
}

/// Lifecycle status of a platform broadcast object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastLifecycle {
    /// Created but not yet bound to a stream.
    Created,
    /// Bound and ready to go live.
    Ready,
    /// Test transmission underway.
    Testing,
    /// Live to viewers.
    Live,
    /// Finished normally.
    Complete,
    /// Revoked by the platform.
    Revoked,
}

impl BroadcastLifecycle {
    /// True for statuses after which the session cannot continue.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Revoked)
    }
}

/// Health status of a platform ingest stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamHealth {
    /// Receiving data, no problems.
    Good,
    /// Receiving data with minor problems.
    Ok,
    /// Receiving data with serious problems.
    Bad,
    /// Not receiving data.
    NoData,
    /// Stream revoked by the platform.
    Revoked,
}

impl StreamHealth {
    /// True when the platform is not receiving usable data at all.
    pub const fn is_unreceiving(self) -> bool {
        matches!(self, Self::NoData | Self::Revoked)
    }
}

/// Severity of a platform stream configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Informational only.
    Info,
    /// Degraded but streaming.
    Warning,
    /// Stream is broken or will break.
    Error,
}

/// Operating mode commanded on the RTMP forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwarderMode {
    /// Forward the camera feed to the platform ingest.
    Stream,
    /// Emit the standing slate image.
    Slate,
}

/// Kind of operations notification, used in rate-limit keys and suppress
/// rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    /// Broadcast lifecycle problems (start failures, disablement).
    Broadcast,
    /// Stream health problems.
    Health,
    /// Camera or controller problems.
    Hardware,
    /// Connectivity problems with external services.
    Network,
}

impl NotifyKind {
    /// The lowercase form used in `"_<kind>.<recipient>"` rate-limit keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Health => "health",
            Self::Hardware => "hardware",
            Self::Network => "network",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_tags_roundtrip() {
        for state in ALL_BROADCAST_STATES {
            assert_eq!(BroadcastState::from_tag(state.tag()), Some(state));
            let parsed: BroadcastState = state.tag().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn serde_tags_match_display_tags() {
        for state in ALL_BROADCAST_STATES {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.tag()));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(BroadcastState::from_tag("vidforwardTertiaryLive").is_none());
        assert!("".parse::<BroadcastState>().is_err());
    }

    #[test]
    fn hardware_tags_roundtrip() {
        for tag in ["off", "starting", "on", "stopping", "restarting", "failure"] {
            let state = HardwareState::from_tag(tag).unwrap();
            assert_eq!(state.tag(), tag);
        }
        assert!(HardwareState::from_tag("rebooting").is_none());
    }

    #[test]
    fn flavour_targets_are_consistent() {
        use BroadcastState as B;
        assert_eq!(B::DirectLiveUnhealthy.idle(), B::DirectIdle);
        assert_eq!(B::VidforwardSecondaryLive.finish_target(), B::VidforwardSecondaryIdle);
        assert_eq!(
            B::VidforwardPermanentLive.finish_target(),
            B::VidforwardPermanentTransitionLiveToSlate
        );
        assert_eq!(B::VidforwardPermanentSlate.unhealthy().healthy(), B::VidforwardPermanentSlate);
        assert_eq!(B::VidforwardPermanentIdle.starting(), B::VidforwardPermanentStarting);
    }

    #[test]
    fn stream_health_serialises_camel_case() {
        let json = serde_json::to_string(&StreamHealth::NoData).unwrap();
        assert_eq!(json, "\"noData\"");
    }
}
