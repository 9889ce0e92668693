//! The broadcast orchestrator: two coupled state machines on an in-tick
//! event bus.
//!
//! On each tick (delivered by an external cron service, minute
//! granularity) the driver loads every broadcast config for a site,
//! rehydrates a broadcast state machine and a hardware state machine from
//! the committed state tags, replays any events queued from the previous
//! run, and publishes a `time` event. Subscribers react synchronously;
//! everything they raise is delivered within the same tick, and anything
//! left undelivered when the tick is cancelled is persisted for the next
//! run.
//!
//! # Modules
//!
//! - [`bus`] -- single-threaded pub/sub with depth-first reentry and a
//!   post-cancel spill sink
//! - [`context`] -- per-broadcast tick context: config snapshot, adapters,
//!   transactional commit helpers
//! - [`hardware`] -- camera rig lifecycle machine
//! - [`broadcast`] -- broadcast lifecycle machine over the sixteen
//!   canonical states
//! - [`health`], [`status`], [`chat`] -- ancillary handlers bridging
//!   platform probes back onto the bus
//! - [`tick`] -- the driver: load, rehydrate, replay, publish `time`,
//!   persist spill
//! - [`settings`] -- intervals, timeouts, and retry policy

pub mod broadcast;
pub mod bus;
pub mod chat;
pub mod context;
pub mod error;
pub mod hardware;
pub mod health;
pub mod settings;
pub mod status;
pub mod tick;

// Re-export primary types for convenience.
pub use broadcast::BroadcastMachine;
pub use bus::{EventBus, EventHandler};
pub use context::TickContext;
pub use error::OrchestratorError;
pub use hardware::HardwareMachine;
pub use settings::OrchestratorSettings;
pub use tick::{BroadcastOutcome, Orchestrator, TickReport};
