//! Shared type definitions for the Ocean Bench broadcast orchestrator.
//!
//! This crate is the single source of truth for the types that cross crate
//! boundaries: the durable [`BroadcastConfig`] record, the broadcast and
//! hardware state tags, the event vocabulary of the in-tick bus, and the
//! state projection tuple that ties the boolean flags on a committed config
//! to exactly one canonical broadcast state.
//!
//! # Modules
//!
//! - [`ids`] -- `SiteKey` and MAC address newtypes
//! - [`enums`] -- state tags, platform lifecycle/health enums, event-free
//!   enumerations (privacy, forwarder mode, notification kinds)
//! - [`event`] -- the orchestrator event vocabulary with its stable tags
//! - [`config`] -- the durable `BroadcastConfig` record and its
//!   state-private data blobs
//! - [`projection`] -- the `(v, s2, a, sl, st, u, tr)` tuple and its
//!   bijective mapping onto the canonical broadcast states

pub mod config;
pub mod enums;
pub mod event;
pub mod ids;
pub mod projection;

// Re-export all public types at crate root for convenience.
pub use config::{
    BroadcastConfig, HardwareStateData, SensorEntry, StateData, broadcast_key, SECONDARY_SUFFIX,
};
pub use enums::{
    BroadcastLifecycle, BroadcastState, Flavor, ForwarderMode, HardwareState, IssueSeverity,
    NotifyKind, Privacy, StreamHealth,
};
pub use event::Event;
pub use ids::{Mac, SiteKey};
pub use projection::{ProjectionError, StateProjection};
