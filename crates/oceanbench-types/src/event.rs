//! The orchestrator event vocabulary.
//!
//! Events are in-memory values dispatched over the per-tick bus. Each kind
//! has a stable string tag used for logging and for persisting undelivered
//! events into a config's redelivery queue. Only `time` carries a payload;
//! a replayed `time` tag is reconstructed with the current tick instant.

use chrono::{DateTime, Utc};

/// An event dispatched on the per-tick bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The tick heartbeat, carrying the wall-clock instant.
    Time(DateTime<Utc>),
    /// A broadcast start sequence has begun.
    Start,
    /// The platform broadcast was started successfully.
    Started,
    /// The platform broadcast failed to start.
    StartFailed,
    /// The session is over (schedule elapsed or terminal platform status).
    Finish,
    /// A health probe came back bad.
    BadHealth,
    /// A health probe came back good.
    GoodHealth,
    /// The health-check interval has elapsed.
    HealthCheckDue,
    /// The status-check interval has elapsed.
    StatusCheckDue,
    /// The chat-message interval has elapsed.
    ChatMessageDue,
    /// Ask the hardware machine to power the camera on.
    HardwareStartRequest,
    /// Ask the hardware machine to power the camera off.
    HardwareStopRequest,
    /// Ask the hardware machine to power-cycle the camera.
    HardwareResetRequest,
    /// The camera came up (liveness probe fresh).
    HardwareStarted,
    /// The camera went down (liveness probe stale).
    HardwareStopped,
    /// The camera failed to come up in time.
    HardwareStartFailed,
    /// The camera failed to go down in time.
    HardwareStopFailed,
}

impl Event {
    /// The stable string tag of this event.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Time(_) => "time",
            Self::Start => "start",
            Self::Started => "started",
            Self::StartFailed => "startFailed",
            Self::Finish => "finish",
            Self::BadHealth => "badHealth",
            Self::GoodHealth => "goodHealth",
            Self::HealthCheckDue => "healthCheckDue",
            Self::StatusCheckDue => "statusCheckDue",
            Self::ChatMessageDue => "chatMessageDue",
            Self::HardwareStartRequest => "hardwareStartRequest",
            Self::HardwareStopRequest => "hardwareStopRequest",
            Self::HardwareResetRequest => "hardwareResetRequest",
            Self::HardwareStarted => "hardwareStarted",
            Self::HardwareStopped => "hardwareStopped",
            Self::HardwareStartFailed => "hardwareStartFailed",
            Self::HardwareStopFailed => "hardwareStopFailed",
        }
    }

    /// Reconstruct an event from a persisted tag.
    ///
    /// A `time` tag is rebuilt with `now` since the original instant is not
    /// persisted. Returns `None` for unrecognised tags, which redelivery
    /// drops with a log line.
    pub fn from_tag(tag: &str, now: DateTime<Utc>) -> Option<Self> {
        match tag {
            "time" => Some(Self::Time(now)),
            "start" => Some(Self::Start),
            "started" => Some(Self::Started),
            "startFailed" => Some(Self::StartFailed),
            "finish" => Some(Self::Finish),
            "badHealth" => Some(Self::BadHealth),
            "goodHealth" => Some(Self::GoodHealth),
            "healthCheckDue" => Some(Self::HealthCheckDue),
            "statusCheckDue" => Some(Self::StatusCheckDue),
            "chatMessageDue" => Some(Self::ChatMessageDue),
            "hardwareStartRequest" => Some(Self::HardwareStartRequest),
            "hardwareStopRequest" => Some(Self::HardwareStopRequest),
            "hardwareResetRequest" => Some(Self::HardwareResetRequest),
            "hardwareStarted" => Some(Self::HardwareStarted),
            "hardwareStopped" => Some(Self::HardwareStopped),
            "hardwareStartFailed" => Some(Self::HardwareStartFailed),
            "hardwareStopFailed" => Some(Self::HardwareStopFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip() {
        let now = Utc::now();
        let all = [
            Event::Time(now),
            Event::Start,
            Event::Started,
            Event::StartFailed,
            Event::Finish,
            Event::BadHealth,
            Event::GoodHealth,
            Event::HealthCheckDue,
            Event::StatusCheckDue,
            Event::ChatMessageDue,
            Event::HardwareStartRequest,
            Event::HardwareStopRequest,
            Event::HardwareResetRequest,
            Event::HardwareStarted,
            Event::HardwareStopped,
            Event::HardwareStartFailed,
            Event::HardwareStopFailed,
        ];
        for event in all {
            assert_eq!(Event::from_tag(event.tag(), now), Some(event));
        }
    }

    #[test]
    fn unknown_tag_yields_none() {
        assert_eq!(Event::from_tag("hardwareExploded", Utc::now()), None);
    }
}
