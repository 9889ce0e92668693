//! External capability adapters for the broadcast orchestrator.
//!
//! The orchestrator consumes four external capabilities, each described by
//! its surface rather than its implementation:
//!
//! - [`VideoPlatform`] -- the live-streaming platform (create / start /
//!   stop / status / health / chat / privacy)
//! - [`Forwarder`] -- the slate-capable RTMP forwarder (`vidforward`)
//! - [`CameraControl`] -- camera power control over the device-variable
//!   store, plus the uptime liveness probe
//! - [`Notifier`] -- rate-limited operations notifications
//!
//! Production implementations are HTTP-backed with a per-call timeout;
//! every network failure maps to [`AdapterError`] and is non-fatal for the
//! tick. The [`fakes`] module holds in-memory implementations for tests.

pub mod camera;
pub mod error;
pub mod fakes;
pub mod forwarder;
pub mod notifier;
pub mod platform;

// Re-export primary types for convenience.
pub use camera::CameraControl;
pub use error::AdapterError;
pub use fakes::{FakeForwarder, FakeNotifier, FakePlatform};
pub use forwarder::{Forwarder, HttpForwarder};
pub use notifier::{Notifier, OpsNotifier};
pub use platform::{
    BroadcastHandles, ConfigIssue, HealthReport, HttpVideoPlatform, VideoPlatform,
};
