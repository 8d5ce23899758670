//! Release Trigger Arbiter.
//!
//! One explicit state machine decides whether a release may be dispatched for
//! a lease. Every trigger (cancel, timeout, unload, teardown) asks the arbiter
//! first; only a `Dispatch` decision may be followed by a network call.
//!
//! ```text
//!   Active ──request_release──▶ ReleaseInFlight ──complete_release──▶ Released
//!     │                               │
//!     └────────── suppress ───────────┴──────────▶ Suppressed (permanent)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a release was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseReason {
    /// The user clicked "back to event"
    UserCancelled,
    /// The lease timer reached zero
    TimedOut,
    /// The page is being closed, reloaded or torn down
    PageUnloaded,
}

impl ReleaseReason {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserCancelled => "user_cancelled",
            Self::TimedOut => "timed_out",
            Self::PageUnloaded => "page_unloaded",
        }
    }
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release state of a lease
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseState {
    /// Tickets are held and may still be released
    #[default]
    Active,
    /// A release call has been dispatched and has not resolved yet
    ReleaseInFlight,
    /// The tickets were handed back (or the attempt resolved)
    Released,
    /// A purchase attempt began; release is disabled for good
    Suppressed,
}

impl ReleaseState {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::ReleaseInFlight => "release_in_flight",
            Self::Released => "released",
            Self::Suppressed => "suppressed",
        }
    }

    /// Returns `true` while the lease still holds its tickets unreleased
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` while a release call is outstanding
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::ReleaseInFlight)
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a release request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseDecision {
    /// The caller owns the single release and must perform it
    Dispatch {
        /// Reason recorded for the release
        reason: ReleaseReason,
    },
    /// Nothing to do; the lease was in `state`
    Skip {
        /// State that caused the skip
        state: ReleaseState,
    },
}

impl ReleaseDecision {
    /// Returns `true` for [`ReleaseDecision::Dispatch`]
    #[must_use]
    pub const fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch { .. })
    }
}

/// Guard over the release state of one lease
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseArbiter {
    state: ReleaseState,
    reason: Option<ReleaseReason>,
}

impl ReleaseArbiter {
    /// Creates an arbiter for a freshly reserved lease
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ReleaseState::Active,
            reason: None,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ReleaseState {
        self.state
    }

    /// Reason of the dispatched release, if any
    #[must_use]
    pub const fn reason(&self) -> Option<ReleaseReason> {
        self.reason
    }

    /// Check-and-set: claim the release if the lease is still `Active`
    ///
    /// Returns [`ReleaseDecision::Skip`] (never an error) when the lease is
    /// suppressed, already releasing or released.
    pub fn request_release(&mut self, reason: ReleaseReason) -> ReleaseDecision {
        match self.state {
            ReleaseState::Active => {
                self.state = ReleaseState::ReleaseInFlight;
                self.reason = Some(reason);
                tracing::debug!(reason = %reason, "Release claimed");
                ReleaseDecision::Dispatch { reason }
            },
            state => {
                tracing::debug!(reason = %reason, state = %state, "Release request skipped");
                metrics::counter!("checkout.release.skipped", "state" => state.as_str())
                    .increment(1);
                ReleaseDecision::Skip { state }
            },
        }
    }

    /// Record that the dispatched release resolved
    ///
    /// A failure is logged and otherwise treated like success: the release
    /// is never retried and never surfaced to the user. Completions arriving
    /// in any state other than `ReleaseInFlight` are ignored.
    pub fn complete_release(&mut self, reason: ReleaseReason, result: Result<(), &str>) {
        if !self.state.is_in_flight() {
            tracing::debug!(
                reason = %reason,
                state = %self.state,
                "Ignoring late release completion"
            );
            return;
        }

        if let Err(error) = result {
            tracing::warn!(reason = %reason, error, "Release call failed; tickets expire server-side");
            metrics::counter!("checkout.release.failed").increment(1);
        }

        self.state = ReleaseState::Released;
    }

    /// Record a release that needs no completion (fire-and-forget beacon)
    ///
    /// Only meaningful right after a `Dispatch` decision.
    pub(crate) fn mark_released(&mut self) {
        if self.state.is_in_flight() {
            self.state = ReleaseState::Released;
        }
    }

    /// Disable release for the rest of the lease's life
    ///
    /// Called synchronously before a purchase call is issued. A release
    /// already in flight is not cancelled; its completion is ignored.
    pub fn suppress(&mut self) {
        if self.state == ReleaseState::Released {
            tracing::warn!("Suppressing a lease that was already released");
        }
        self.state = ReleaseState::Suppressed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_request_dispatches() {
        let mut arbiter = ReleaseArbiter::new();
        assert_eq!(
            arbiter.request_release(ReleaseReason::UserCancelled),
            ReleaseDecision::Dispatch {
                reason: ReleaseReason::UserCancelled
            }
        );
        assert_eq!(arbiter.state(), ReleaseState::ReleaseInFlight);
        assert_eq!(arbiter.reason(), Some(ReleaseReason::UserCancelled));
    }

    #[test]
    fn test_request_while_in_flight_is_rejected() {
        let mut arbiter = ReleaseArbiter::new();
        arbiter.request_release(ReleaseReason::TimedOut);

        assert_eq!(
            arbiter.request_release(ReleaseReason::PageUnloaded),
            ReleaseDecision::Skip {
                state: ReleaseState::ReleaseInFlight
            }
        );
        assert_eq!(arbiter.reason(), Some(ReleaseReason::TimedOut));
    }

    #[test]
    fn test_released_is_terminal_noop() {
        let mut arbiter = ReleaseArbiter::new();
        arbiter.request_release(ReleaseReason::UserCancelled);
        arbiter.complete_release(ReleaseReason::UserCancelled, Ok(()));

        assert_eq!(arbiter.state(), ReleaseState::Released);
        assert!(!arbiter.request_release(ReleaseReason::PageUnloaded).is_dispatch());
        assert_eq!(arbiter.state(), ReleaseState::Released);
    }

    #[test]
    fn test_failed_release_still_resolves() {
        let mut arbiter = ReleaseArbiter::new();
        arbiter.request_release(ReleaseReason::TimedOut);
        arbiter.complete_release(ReleaseReason::TimedOut, Err("503 Service Unavailable"));

        assert_eq!(arbiter.state(), ReleaseState::Released);
    }

    #[test]
    fn test_suppress_blocks_every_later_request() {
        let mut arbiter = ReleaseArbiter::new();
        arbiter.suppress();

        for reason in [
            ReleaseReason::UserCancelled,
            ReleaseReason::TimedOut,
            ReleaseReason::PageUnloaded,
        ] {
            assert_eq!(
                arbiter.request_release(reason),
                ReleaseDecision::Skip {
                    state: ReleaseState::Suppressed
                }
            );
        }
    }

    #[test]
    fn test_late_completion_after_suppress_is_ignored() {
        let mut arbiter = ReleaseArbiter::new();
        arbiter.request_release(ReleaseReason::UserCancelled);
        arbiter.suppress();
        arbiter.complete_release(ReleaseReason::UserCancelled, Ok(()));

        assert_eq!(arbiter.state(), ReleaseState::Suppressed);
    }

    #[test]
    fn test_completion_without_dispatch_is_ignored() {
        let mut arbiter = ReleaseArbiter::new();
        arbiter.complete_release(ReleaseReason::TimedOut, Ok(()));
        assert_eq!(arbiter.state(), ReleaseState::Active);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Request(ReleaseReason),
        Complete(bool),
        Suppress,
    }

    fn op() -> impl Strategy<Value = Op> {
        let reason = prop_oneof![
            Just(ReleaseReason::UserCancelled),
            Just(ReleaseReason::TimedOut),
            Just(ReleaseReason::PageUnloaded),
        ];
        prop_oneof![
            reason.prop_map(Op::Request),
            any::<bool>().prop_map(Op::Complete),
            Just(Op::Suppress),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_dispatch(ops in prop::collection::vec(op(), 0..40)) {
            let mut arbiter = ReleaseArbiter::new();
            let mut dispatched = 0;
            let mut dispatched_after_suppress = 0;
            let mut suppressed = false;

            for op in ops {
                match op {
                    Op::Request(reason) => {
                        if arbiter.request_release(reason).is_dispatch() {
                            dispatched += 1;
                            if suppressed {
                                dispatched_after_suppress += 1;
                            }
                        }
                    },
                    Op::Complete(ok) => {
                        let reason = arbiter.reason().unwrap_or(ReleaseReason::TimedOut);
                        let result = if ok { Ok(()) } else { Err("boom") };
                        arbiter.complete_release(reason, result);
                    },
                    Op::Suppress => {
                        suppressed = true;
                        arbiter.suppress();
                    },
                }
            }

            prop_assert!(dispatched <= 1);
            prop_assert_eq!(dispatched_after_suppress, 0);
            if suppressed {
                prop_assert_eq!(arbiter.state(), ReleaseState::Suppressed);
            }
        }
    }
}
