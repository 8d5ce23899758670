//! Lease Timer: a monotonic countdown that fires its expiry exactly once.
//!
//! The timer itself is plain state. The coordinator schedules one tick at a
//! time as a cancellable delay effect under [`LEASE_TIMER`] and feeds each
//! tick back here; a tick that arrives after stop or expiry is ignored.

use lease_core::effect::EffectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Effect id of the pending timer tick
pub const LEASE_TIMER: EffectId = EffectId::new("checkout.lease_timer");

/// Lifecycle of the countdown
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerStatus {
    /// Created but not yet mounted
    #[default]
    Idle,
    /// Counting down
    Running,
    /// Reached zero; expiry was reported
    Expired,
    /// Stopped by unmount or a terminal outcome
    Stopped,
}

/// Result of feeding one tick into the timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still counting
    Ticked {
        /// Seconds left after this tick
        remaining: u64,
    },
    /// This tick reached zero; reported once per timer
    Expired,
    /// The timer is not running; the tick is not observable
    Ignored,
}

/// Countdown for one lease
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseTimer {
    remaining: u64,
    status: TimerStatus,
}

impl LeaseTimer {
    /// Creates an idle timer for a lease of `seconds`
    #[must_use]
    pub const fn new(seconds: u64) -> Self {
        Self {
            remaining: seconds,
            status: TimerStatus::Idle,
        }
    }

    /// Starts counting; returns `false` if the timer was not idle
    pub fn start(&mut self) -> bool {
        if self.status != TimerStatus::Idle {
            return false;
        }
        self.status = TimerStatus::Running;
        true
    }

    /// Advances the countdown by one second
    pub fn tick(&mut self) -> TickOutcome {
        if self.status != TimerStatus::Running {
            return TickOutcome::Ignored;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.status = TimerStatus::Expired;
            TickOutcome::Expired
        } else {
            TickOutcome::Ticked {
                remaining: self.remaining,
            }
        }
    }

    /// Stops a running timer; returns `true` if it was running
    pub fn stop(&mut self) -> bool {
        if self.status == TimerStatus::Running {
            self.status = TimerStatus::Stopped;
            true
        } else {
            false
        }
    }

    /// Seconds left
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> TimerStatus {
        self.status
    }

    /// Returns `true` while counting down
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.status, TimerStatus::Running)
    }

    /// Remaining time as `M:SS`
    #[must_use]
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LeaseTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        assert_eq!(LeaseTimer::new(600).display(), "10:00");
        assert_eq!(LeaseTimer::new(45).display(), "0:45");
        assert_eq!(LeaseTimer::new(61).display(), "1:01");
        assert_eq!(LeaseTimer::new(0).display(), "0:00");
    }

    #[test]
    fn test_ticks_are_ignored_until_started() {
        let mut timer = LeaseTimer::new(3);
        assert_eq!(timer.tick(), TickOutcome::Ignored);
        assert_eq!(timer.remaining(), 3);
    }

    #[test]
    fn test_expires_exactly_once() {
        let mut timer = LeaseTimer::new(3);
        assert!(timer.start());
        assert!(!timer.start());

        assert_eq!(timer.tick(), TickOutcome::Ticked { remaining: 2 });
        assert_eq!(timer.tick(), TickOutcome::Ticked { remaining: 1 });
        assert_eq!(timer.tick(), TickOutcome::Expired);

        for _ in 0..5 {
            assert_eq!(timer.tick(), TickOutcome::Ignored);
        }
        assert_eq!(timer.display(), "0:00");
        assert_eq!(timer.status(), TimerStatus::Expired);
    }

    #[test]
    fn test_stop_freezes_remaining() {
        let mut timer = LeaseTimer::new(600);
        timer.start();
        timer.tick();
        assert!(timer.stop());
        assert!(!timer.stop());

        assert_eq!(timer.tick(), TickOutcome::Ignored);
        assert_eq!(timer.display(), "9:59");
        assert_eq!(timer.status(), TimerStatus::Stopped);
    }

    #[test]
    fn test_stop_after_expiry_keeps_expired() {
        let mut timer = LeaseTimer::new(1);
        timer.start();
        assert_eq!(timer.tick(), TickOutcome::Expired);
        assert!(!timer.stop());
        assert_eq!(timer.status(), TimerStatus::Expired);
    }

    #[test]
    fn test_zero_length_lease_expires_on_first_tick() {
        let mut timer = LeaseTimer::new(0);
        timer.start();
        assert_eq!(timer.tick(), TickOutcome::Expired);
    }
}
