//! Error types for the orchestrator.
//!
//! The error taxonomy follows the recovery design: adapter errors are
//! handled inside the event handlers (logged, no transition, retried next
//! tick) and never surface here; what does surface is config corruption
//! (skip that broadcast without mutating it) and store failures (abort
//! the broadcast's tick -- no transition is observable without a commit).

use oceanbench_store::StoreError;
use oceanbench_types::ProjectionError;
use uuid::Uuid;

/// Errors that can occur while ticking a broadcast.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A transactional config commit failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The committed projection flags do not map to any state.
    #[error("unknown state for broadcast: {0}")]
    Projection(#[from] ProjectionError),

    /// The committed record cannot be interpreted.
    #[error("corrupt config for broadcast {uuid}: {reason}")]
    CorruptConfig {
        /// The offending broadcast.
        uuid: Uuid,
        /// Why the record could not be interpreted.
        reason: String,
    },

    /// Nested publishes exceeded the recursion cap; an event handler is
    /// feeding the bus a loop.
    #[error("event cascade exceeded depth {depth} at {tag}")]
    EventLoop {
        /// The cap that was hit.
        depth: usize,
        /// Tag of the event that would have recursed further.
        tag: &'static str,
    },
}

impl OrchestratorError {
    /// True when the broadcast should be skipped without mutation rather
    /// than retried.
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Projection(_) | Self::CorruptConfig { .. })
    }
}
