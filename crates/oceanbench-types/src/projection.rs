//! The broadcast state projection tuple.
//!
//! A committed config carries seven boolean flags
//! `(using_vidforward, is_secondary, active, slate, starting, unhealthy,
//! transitioning)`. Those flags and the committed state tag must always
//! agree: the mapping below is total over the sixteen canonical states and
//! rejects every other combination, which the tick driver treats as config
//! corruption.
//!
//! Secondary states accept either value of `using_vidforward` when mapping
//! tuple -> state (a secondary only exists alongside a forwarder, but the
//! flag is not required on its own record); the canonical tuple produced
//! by state -> tuple sets it.

use serde::{Deserialize, Serialize};

use crate::enums::BroadcastState;

/// The `(v, s2, a, sl, st, u, tr)` labelling of a broadcast state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StateProjection {
    /// `v` -- slate-capable forwarder mode.
    pub using_vidforward: bool,
    /// `s2` -- secondary broadcast.
    pub is_secondary: bool,
    /// `a` -- session underway.
    pub active: bool,
    /// `sl` -- slate emitting.
    pub slate: bool,
    /// `st` -- start sequence underway.
    pub starting: bool,
    /// `u` -- health probes failing.
    pub unhealthy: bool,
    /// `tr` -- moving between live and slate.
    pub transitioning: bool,
}

/// A flag combination that does not label any canonical state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "no state for projection (v={v} s2={s2} a={a} sl={sl} st={st} u={u} tr={tr})",
    v = .0.using_vidforward,
    s2 = .0.is_secondary,
    a = .0.active,
    sl = .0.slate,
    st = .0.starting,
    u = .0.unhealthy,
    tr = .0.transitioning
)]
pub struct ProjectionError(pub StateProjection);

impl StateProjection {
    /// Resolve the tuple to its canonical state.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] for combinations outside the
    /// enumerated table; the caller must treat the record as corrupt.
    pub fn to_state(self) -> Result<BroadcastState, ProjectionError> {
        use BroadcastState as B;
        let Self {
            using_vidforward,
            is_secondary,
            active,
            slate,
            starting,
            unhealthy,
            transitioning,
        } = self;

        let state = match (
            is_secondary,
            using_vidforward,
            active,
            slate,
            starting,
            unhealthy,
            transitioning,
        ) {
            // Secondary: `using_vidforward` may be either value.
            (true, _, false, false, false, false, false) => B::VidforwardSecondaryIdle,
            (true, _, false, false, true, false, false) => B::VidforwardSecondaryStarting,
            (true, _, true, false, false, false, false) => B::VidforwardSecondaryLive,
            (true, _, true, false, false, true, false) => B::VidforwardSecondaryLiveUnhealthy,

            // Permanent (vidforward, non-secondary).
            (false, true, false, false, false, false, false) => B::VidforwardPermanentIdle,
            (false, true, false, false, true, false, false) => B::VidforwardPermanentStarting,
            (false, true, true, false, false, false, false) => B::VidforwardPermanentLive,
            (false, true, true, false, false, true, false) => B::VidforwardPermanentLiveUnhealthy,
            (false, true, true, false, false, false, true) => {
                B::VidforwardPermanentTransitionLiveToSlate
            }
            (false, true, true, true, false, false, false) => B::VidforwardPermanentSlate,
            (false, true, true, true, false, true, false) => B::VidforwardPermanentSlateUnhealthy,
            (false, true, true, true, false, false, true) => {
                B::VidforwardPermanentTransitionSlateToLive
            }

            // Direct.
            (false, false, false, false, false, false, false) => B::DirectIdle,
            (false, false, false, false, true, false, false) => B::DirectStarting,
            (false, false, true, false, false, false, false) => B::DirectLive,
            (false, false, true, false, false, true, false) => B::DirectLiveUnhealthy,

            _ => return Err(ProjectionError(self)),
        };
        Ok(state)
    }

    /// The canonical tuple of a state.
    pub const fn from_state(state: BroadcastState) -> Self {
        use BroadcastState as B;
        let (using_vidforward, is_secondary, active, slate, starting, unhealthy, transitioning) =
            match state {
                B::VidforwardPermanentIdle => (true, false, false, false, false, false, false),
                B::VidforwardPermanentStarting => (true, false, false, false, true, false, false),
                B::VidforwardPermanentLive => (true, false, true, false, false, false, false),
                B::VidforwardPermanentLiveUnhealthy => {
                    (true, false, true, false, false, true, false)
                }
                B::VidforwardPermanentTransitionLiveToSlate => {
                    (true, false, true, false, false, false, true)
                }
                B::VidforwardPermanentSlate => (true, false, true, true, false, false, false),
                B::VidforwardPermanentSlateUnhealthy => {
                    (true, false, true, true, false, true, false)
                }
                B::VidforwardPermanentTransitionSlateToLive => {
                    (true, false, true, true, false, false, true)
                }
                B::VidforwardSecondaryIdle => (true, true, false, false, false, false, false),
                B::VidforwardSecondaryStarting => (true, true, false, false, true, false, false),
                B::VidforwardSecondaryLive => (true, true, true, false, false, false, false),
                B::VidforwardSecondaryLiveUnhealthy => (true, true, true, false, false, true, false),
                B::DirectIdle => (false, false, false, false, false, false, false),
                B::DirectStarting => (false, false, false, false, true, false, false),
                B::DirectLive => (false, false, true, false, false, false, false),
                B::DirectLiveUnhealthy => (false, false, true, false, false, true, false),
            };
        Self {
            using_vidforward,
            is_secondary,
            active,
            slate,
            starting,
            unhealthy,
            transitioning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::ALL_BROADCAST_STATES;

    #[test]
    fn projection_is_a_bijection_over_canonical_tuples() {
        for state in ALL_BROADCAST_STATES {
            let tuple = StateProjection::from_state(state);
            assert_eq!(tuple.to_state().ok(), Some(state), "state {state}");
            // And back again: state -> tuple -> state -> tuple.
            assert_eq!(StateProjection::from_state(state), tuple);
        }
    }

    #[test]
    fn secondary_accepts_either_forwarder_flag() {
        let mut tuple = StateProjection::from_state(BroadcastState::VidforwardSecondaryLive);
        tuple.using_vidforward = false;
        assert_eq!(
            tuple.to_state().ok(),
            Some(BroadcastState::VidforwardSecondaryLive)
        );
    }

    #[test]
    fn unknown_tuples_raise() {
        // Slate without active.
        let bad = StateProjection {
            using_vidforward: true,
            slate: true,
            ..StateProjection::default()
        };
        assert!(bad.to_state().is_err());

        // Direct cannot slate.
        let bad = StateProjection {
            active: true,
            slate: true,
            ..StateProjection::default()
        };
        assert!(bad.to_state().is_err());

        // Starting and active are mutually exclusive.
        let bad = StateProjection {
            using_vidforward: true,
            active: true,
            starting: true,
            ..StateProjection::default()
        };
        assert!(bad.to_state().is_err());

        // Unhealthy idle is not a state.
        let bad = StateProjection {
            unhealthy: true,
            ..StateProjection::default()
        };
        assert!(bad.to_state().is_err());
    }
}
