//! Reservation Lease Coordinator.
//!
//! The checkout page as a reducer. Every trigger that can touch the lease is a
//! [`CheckoutAction`]: the mount, each timer tick, the "back to event" click,
//! the browser unload signal, the in-app teardown, the purchase click and the
//! network responses. The store reduces them one at a time, so the arbiter's
//! check-and-set never interleaves with another trigger.
//!
//! Signal to release reason:
//!
//! | Signal          | Reason          | Transport | Navigation                   |
//! |-----------------|-----------------|-----------|------------------------------|
//! | `BackToEvent`   | `UserCancelled` | request   | event page after completion  |
//! | timer expiry    | `TimedOut`      | request   | event page after completion  |
//! | `PageUnloading` | `PageUnloaded`  | beacon    | none (the page is going)     |
//! | `Unmounted`     | `PageUnloaded`  | request   | none (already navigating)    |

use crate::api::{BeaconSender, PurchaseResponse, ReservationApi};
use crate::arbiter::{ReleaseDecision, ReleaseReason, ReleaseState};
use crate::error::CheckoutError;
use crate::finalizer::PurchaseFinalizer;
use crate::navigation::{Navigation, UnloadPrompt};
use crate::timer::{LEASE_TIMER, LeaseTimer, TickOutcome};
use crate::types::ReservationLease;
use lease_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Actions
// ============================================================================

/// Inputs to the checkout page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutAction {
    /// The page mounted with tickets already reserved; starts the countdown
    Mounted,
    /// One countdown tick elapsed
    Tick,
    /// The user clicked "back to event"
    BackToEvent,
    /// The browser is closing or reloading the page
    PageUnloading,
    /// The page is being torn down by an in-app route change
    Unmounted,
    /// The user clicked the checkout button
    PurchaseRequested,
    /// The purchase call returned successfully
    PurchaseSucceeded {
        /// Decoded response
        response: PurchaseResponse,
    },
    /// The purchase call failed
    PurchaseFailed {
        /// Error description shown to the user
        error: String,
    },
    /// A release call resolved
    ReleaseCompleted {
        /// Reason the release was dispatched with
        reason: ReleaseReason,
        /// Failure description, if the call failed
        error: Option<String>,
    },
}

// ============================================================================
// State
// ============================================================================

/// Terminal (or last) result of the checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutOutcome {
    /// The purchase call succeeded
    Purchased {
        /// Zero-total order
        is_free: bool,
        /// Payment page for paid orders
        checkout_url: Option<String>,
    },
    /// The tickets were released
    Released {
        /// Why
        reason: ReleaseReason,
    },
    /// The last purchase attempt failed; the user may retry
    Failed {
        /// What went wrong
        error: CheckoutError,
    },
}

/// Lifecycle of the page itself
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PagePhase {
    /// Constructed, not yet mounted
    #[default]
    Loading,
    /// Interactive
    Mounted,
    /// Unloading or unmounted; late responses are ignored
    Leaving,
}

/// Page-scoped state of the checkout
#[derive(Clone, Debug)]
pub struct CheckoutState {
    /// The lease; release state changes only through its arbiter
    pub lease: ReservationLease,
    /// Countdown
    pub timer: LeaseTimer,
    /// Purchase attempts
    pub purchase: PurchaseFinalizer,
    /// Page lifecycle
    pub page: PagePhase,
    /// Cancel or timeout waiting for its release call before navigating
    pub pending_exit: Option<ReleaseReason>,
    /// Where the page should go, once decided
    pub navigation: Option<Navigation>,
    /// Latest outcome
    pub outcome: Option<CheckoutOutcome>,
    /// Error shown next to the checkout button
    pub last_error: Option<CheckoutError>,
    /// Confirmation requested by the last unload signal
    pub unload_prompt: UnloadPrompt,
}

impl CheckoutState {
    /// Creates the page state for a freshly reserved lease
    #[must_use]
    pub fn new(lease: ReservationLease) -> Self {
        Self {
            timer: LeaseTimer::new(lease.expires_in_seconds),
            lease,
            purchase: PurchaseFinalizer::new(),
            page: PagePhase::Loading,
            pending_exit: None,
            navigation: None,
            outcome: None,
            last_error: None,
            unload_prompt: UnloadPrompt::None,
        }
    }

    /// Returns `true` once the page started leaving
    #[must_use]
    pub const fn is_leaving(&self) -> bool {
        matches!(self.page, PagePhase::Leaving)
    }

    /// Returns `true` while the checkout button may be pressed
    #[must_use]
    pub const fn checkout_enabled(&self) -> bool {
        matches!(self.page, PagePhase::Mounted)
            && self.pending_exit.is_none()
            && self.navigation.is_none()
            && !self.purchase.is_in_flight()
            && matches!(
                self.lease.release_state(),
                ReleaseState::Active | ReleaseState::Suppressed
            )
    }

    /// Returns `true` while a call the page is waiting on is outstanding
    #[must_use]
    pub const fn is_settling(&self) -> bool {
        self.pending_exit.is_some() || self.purchase.is_in_flight()
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the checkout page
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Reservation service
    pub api: Arc<dyn ReservationApi>,
    /// Unload-time delivery
    pub beacon: Arc<dyn BeaconSender>,
    /// Length of one countdown tick
    pub tick_interval: Duration,
}

impl CheckoutEnvironment {
    /// Creates a new `CheckoutEnvironment` with a one-second tick
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        api: Arc<dyn ReservationApi>,
        beacon: Arc<dyn BeaconSender>,
    ) -> Self {
        Self {
            clock,
            api,
            beacon,
            tick_interval: Duration::from_secs(1),
        }
    }

    /// Overrides the tick length
    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the checkout page
#[derive(Clone, Debug, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new `CheckoutReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn schedule_tick(env: &CheckoutEnvironment) -> Effect<CheckoutAction> {
        Effect::Delay {
            duration: env.tick_interval,
            action: Box::new(CheckoutAction::Tick),
        }
        .cancellable(LEASE_TIMER)
    }

    fn stop_timer(state: &mut CheckoutState) -> Effect<CheckoutAction> {
        if state.timer.stop() {
            tracing::debug!(remaining = state.timer.remaining(), "Lease timer stopped");
        }
        Effect::Cancel(LEASE_TIMER)
    }

    fn release_request(env: &CheckoutEnvironment, reason: ReleaseReason) -> Effect<CheckoutAction> {
        metrics::counter!(
            "checkout.release.dispatched",
            "reason" => reason.as_str(),
            "transport" => "request"
        )
        .increment(1);

        let api = Arc::clone(&env.api);
        Effect::future(async move {
            let error = api.release_reservations().await.err().map(|e| e.to_string());
            Some(CheckoutAction::ReleaseCompleted { reason, error })
        })
    }

    /// Queues the unload release on the beacon sender before the reduction returns
    fn release_beacon(env: &CheckoutEnvironment) {
        metrics::counter!(
            "checkout.release.dispatched",
            "reason" => ReleaseReason::PageUnloaded.as_str(),
            "transport" => "beacon"
        )
        .increment(1);

        let beacon = env.api.release_beacon_data();
        let url = beacon.url.clone();
        if env.beacon.send_beacon(beacon) {
            tracing::debug!(url = %url, "Release beacon queued");
        } else {
            tracing::warn!(url = %url, "Release beacon could not be queued");
        }
    }

    /// Cancel and timeout: release, then go back to the event page
    fn exit_to_event(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
        reason: ReleaseReason,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        match state.lease.arbiter_mut().request_release(reason) {
            ReleaseDecision::Dispatch { reason } => {
                state.pending_exit = Some(reason);
                smallvec![Self::release_request(env, reason)]
            },
            ReleaseDecision::Skip { .. } => {
                state.navigation = Some(Navigation::EventPage {
                    event_id: state.lease.event_id,
                });
                SmallVec::new()
            },
        }
    }

    fn on_tick(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        match state.timer.tick() {
            TickOutcome::Ticked { remaining } => {
                tracing::trace!(remaining, "Lease timer tick");
                smallvec![Self::schedule_tick(env)]
            },
            TickOutcome::Expired => {
                tracing::info!(event_id = %state.lease.event_id, "Lease expired");
                if state.is_leaving() || state.pending_exit.is_some() || state.navigation.is_some()
                {
                    return SmallVec::new();
                }
                Self::exit_to_event(state, env, ReleaseReason::TimedOut)
            },
            TickOutcome::Ignored => SmallVec::new(),
        }
    }

    fn on_release_completed(state: &mut CheckoutState, reason: ReleaseReason, error: Option<&str>) {
        state
            .lease
            .arbiter_mut()
            .complete_release(reason, error.map_or(Ok(()), Err));

        if state.lease.release_state() == ReleaseState::Released && state.outcome.is_none() {
            state.outcome = Some(CheckoutOutcome::Released { reason });
        }

        // Navigation follows the release whether or not it succeeded.
        if state.pending_exit.take().is_some() {
            state.navigation = Some(Navigation::EventPage {
                event_id: state.lease.event_id,
            });
        }
    }

    fn on_page_unloading(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        let held = state.lease.release_state().is_active();
        state.page = PagePhase::Leaving;
        state.unload_prompt = if held {
            UnloadPrompt::Generic
        } else {
            UnloadPrompt::None
        };

        let stop = Self::stop_timer(state);

        if let ReleaseDecision::Dispatch { reason } = state
            .lease
            .arbiter_mut()
            .request_release(ReleaseReason::PageUnloaded)
        {
            // Nothing answers a beacon; the release is final once handed over.
            Self::release_beacon(env);
            state.lease.arbiter_mut().mark_released();
            state.outcome = Some(CheckoutOutcome::Released { reason });
        }

        smallvec![stop]
    }

    fn on_unmounted(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        state.page = PagePhase::Leaving;

        let mut effects: SmallVec<[Effect<CheckoutAction>; 4]> =
            smallvec![Self::stop_timer(state)];

        if let ReleaseDecision::Dispatch { reason } = state
            .lease
            .arbiter_mut()
            .request_release(ReleaseReason::PageUnloaded)
        {
            effects.push(Self::release_request(env, reason));
        }

        effects
    }

    fn on_purchase_requested(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        if !state.checkout_enabled() {
            tracing::debug!(
                page = ?state.page,
                release_state = %state.lease.release_state(),
                purchase = ?state.purchase.phase(),
                "Checkout button is disabled; ignoring purchase request"
            );
            return SmallVec::new();
        }

        let Some(request) = state.purchase.begin(&mut state.lease) else {
            return SmallVec::new();
        };
        state.last_error = None;

        tracing::info!(
            event_id = %request.event_id,
            tickets = request.specific_ticket_ids.len(),
            attempt = state.purchase.attempts(),
            total = %state.lease.total(),
            "Purchase started"
        );
        metrics::counter!("checkout.purchase.attempts").increment(1);

        let api = Arc::clone(&env.api);
        smallvec![Effect::future(async move {
            match api.purchase(request).await {
                Ok(response) => Some(CheckoutAction::PurchaseSucceeded { response }),
                Err(error) => Some(CheckoutAction::PurchaseFailed {
                    error: error.to_string(),
                }),
            }
        })]
    }

    fn on_purchase_completed(
        state: &mut CheckoutState,
        result: Result<PurchaseResponse, String>,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        let event_id = state.lease.event_id;
        let late = state.is_leaving() || state.navigation.is_some();

        let Some(resolved) = state.purchase.complete(event_id, result) else {
            tracing::debug!("Ignoring purchase response with no attempt in flight");
            return SmallVec::new();
        };

        if late {
            tracing::info!(event_id = %event_id, "Ignoring purchase response after the page started leaving");
            return SmallVec::new();
        }

        match resolved {
            Ok(navigation) => {
                let (is_free, checkout_url) = match &navigation {
                    Navigation::ExternalPayment { checkout_url } => (false, Some(checkout_url.clone())),
                    _ => (true, None),
                };
                tracing::info!(event_id = %event_id, is_free, "Purchase succeeded");
                metrics::counter!(
                    "checkout.purchase.outcome",
                    "result" => if is_free { "free" } else { "paid" }
                )
                .increment(1);

                state.outcome = Some(CheckoutOutcome::Purchased {
                    is_free,
                    checkout_url,
                });
                state.navigation = Some(navigation);
                smallvec![Self::stop_timer(state)]
            },
            Err(error) => {
                tracing::warn!(event_id = %event_id, error = %error, "Purchase attempt failed");
                metrics::counter!(
                    "checkout.purchase.outcome",
                    "result" => if error.is_recoverable() { "failed" } else { "missing_checkout_url" }
                )
                .increment(1);

                state.last_error = Some(error.clone());
                state.outcome = Some(CheckoutOutcome::Failed { error });
                SmallVec::new()
            },
        }
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CheckoutAction::Mounted => {
                if state.page != PagePhase::Loading {
                    return SmallVec::new();
                }
                state.page = PagePhase::Mounted;
                state.lease.start_countdown(env.clock.now());

                if state.timer.start() {
                    tracing::info!(
                        event_id = %state.lease.event_id,
                        remaining = %state.timer,
                        "Checkout mounted; lease timer started"
                    );
                    smallvec![Self::schedule_tick(env)]
                } else {
                    SmallVec::new()
                }
            },

            CheckoutAction::Tick => Self::on_tick(state, env),

            CheckoutAction::BackToEvent => {
                if state.is_leaving() || state.pending_exit.is_some() || state.navigation.is_some() {
                    return SmallVec::new();
                }

                let mut effects: SmallVec<[Effect<CheckoutAction>; 4]> =
                    smallvec![Self::stop_timer(state)];
                effects.extend(Self::exit_to_event(state, env, ReleaseReason::UserCancelled));
                effects
            },

            CheckoutAction::PageUnloading => Self::on_page_unloading(state, env),

            CheckoutAction::Unmounted => Self::on_unmounted(state, env),

            CheckoutAction::ReleaseCompleted { reason, error } => {
                Self::on_release_completed(state, reason, error.as_deref());
                SmallVec::new()
            },

            CheckoutAction::PurchaseRequested => Self::on_purchase_requested(state, env),

            CheckoutAction::PurchaseSucceeded { response } => {
                Self::on_purchase_completed(state, Ok(response))
            },

            CheckoutAction::PurchaseFailed { error } => {
                Self::on_purchase_completed(state, Err(error))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::{MockReservationApi, RecordingBeacon};
    use crate::types::{EventId, LineItem, Money, TicketId, TicketTypeId};
    use lease_testing::{ReducerTest, assertions, test_clock};

    fn lease() -> ReservationLease {
        ReservationLease::new(
            EventId::new(),
            vec![LineItem::new(
                TicketTypeId::new(),
                2,
                Money::from_dollars(50),
                [TicketId::new("a"), TicketId::new("b")],
            )],
            // Reserved on the event page, before checkout mounted.
            test_clock().now() - chrono::Duration::minutes(2),
        )
        .unwrap()
    }

    fn create_test_env() -> CheckoutEnvironment {
        CheckoutEnvironment::new(
            Arc::new(test_clock()),
            MockReservationApi::shared(),
            Arc::new(RecordingBeacon::new()),
        )
    }

    fn mounted() -> CheckoutState {
        let mut state = CheckoutState::new(lease());
        state.page = PagePhase::Mounted;
        state.timer.start();
        state
    }

    #[test]
    fn test_mount_starts_timer() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(CheckoutState::new(lease()))
            .when_action(CheckoutAction::Mounted)
            .then_state(|state| {
                assert!(state.timer.is_running());
                // The countdown starts at mount, not at reservation.
                assert_eq!(state.lease.created_at(), test_clock().now());
                assert!(state.checkout_enabled());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_registers(effects, LEASE_TIMER);
            })
            .run();
    }

    #[test]
    fn test_second_mount_is_ignored() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(CheckoutState::new(lease()))
            .given_actions(vec![CheckoutAction::Mounted])
            .when_action(CheckoutAction::Mounted)
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_tick_reschedules() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .when_action(CheckoutAction::Tick)
            .then_state(|state| assert_eq!(state.timer.display(), "9:59"))
            .then_effects(|effects| assertions::assert_registers(effects, LEASE_TIMER))
            .run();
    }

    #[test]
    fn test_expiry_dispatches_timed_out_release() {
        let mut state = CheckoutState::new(lease().with_expiry_seconds(1));
        state.page = PagePhase::Mounted;
        state.timer.start();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(CheckoutAction::Tick)
            .then_state(|state| {
                assert_eq!(state.pending_exit, Some(ReleaseReason::TimedOut));
                assert!(state.lease.release_state().is_in_flight());
                assert!(state.navigation.is_none());
                assert_eq!(state.timer.display(), "0:00");
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_back_to_event_stops_timer_and_releases() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .when_action(CheckoutAction::BackToEvent)
            .then_state(|state| {
                assert_eq!(state.pending_exit, Some(ReleaseReason::UserCancelled));
                assert!(!state.timer.is_running());
                assert!(!state.checkout_enabled());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_cancels(effects, LEASE_TIMER);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_release_completion_navigates_even_on_failure() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .given_actions(vec![CheckoutAction::BackToEvent])
            .when_action(CheckoutAction::ReleaseCompleted {
                reason: ReleaseReason::UserCancelled,
                error: Some("502 Bad Gateway".into()),
            })
            .then_state(|state| {
                assert_eq!(state.lease.release_state(), ReleaseState::Released);
                assert!(matches!(state.navigation, Some(Navigation::EventPage { .. })));
                assert_eq!(
                    state.outcome,
                    Some(CheckoutOutcome::Released {
                        reason: ReleaseReason::UserCancelled
                    })
                );
                assert!(state.last_error.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_back_to_event_after_purchase_attempt_navigates_without_release() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .given_actions(vec![
                CheckoutAction::PurchaseRequested,
                CheckoutAction::PurchaseFailed {
                    error: "connection reset".into(),
                },
            ])
            .when_action(CheckoutAction::BackToEvent)
            .then_state(|state| {
                assert_eq!(state.lease.release_state(), ReleaseState::Suppressed);
                assert!(matches!(state.navigation, Some(Navigation::EventPage { .. })));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_cancels(effects, LEASE_TIMER);
            })
            .run();
    }

    #[test]
    fn test_unload_while_held_sends_beacon_and_prompts() {
        let beacon = Arc::new(RecordingBeacon::new());
        let env = CheckoutEnvironment::new(
            Arc::new(test_clock()),
            MockReservationApi::shared(),
            beacon.clone(),
        );

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env)
            .given_state(mounted())
            .when_action(CheckoutAction::PageUnloading)
            .then_state(|state| {
                assert_eq!(state.lease.release_state(), ReleaseState::Released);
                assert_eq!(state.unload_prompt, UnloadPrompt::Generic);
                assert!(state.is_leaving());
            })
            .then_effects(|effects| {
                // Queued during the reduction, not from a spawned effect.
                assertions::assert_effects_count(effects, 1);
                assertions::assert_cancels(effects, LEASE_TIMER);
            })
            .run();

        assert_eq!(beacon.sent_count(), 1);
    }

    #[test]
    fn test_refused_beacon_still_settles_the_lease() {
        let beacon = Arc::new(RecordingBeacon::refusing());
        let env = CheckoutEnvironment::new(
            Arc::new(test_clock()),
            MockReservationApi::shared(),
            beacon.clone(),
        );

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env)
            .given_state(mounted())
            .given_actions(vec![CheckoutAction::PageUnloading])
            .when_action(CheckoutAction::PageUnloading)
            .then_state(|state| {
                assert_eq!(state.lease.release_state(), ReleaseState::Released);
                assert_eq!(state.unload_prompt, UnloadPrompt::None);
            })
            .run();

        assert_eq!(beacon.sent_count(), 1);
    }

    #[test]
    fn test_unload_after_purchase_started_is_silent() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .given_actions(vec![CheckoutAction::PurchaseRequested])
            .when_action(CheckoutAction::PageUnloading)
            .then_state(|state| {
                assert_eq!(state.lease.release_state(), ReleaseState::Suppressed);
                assert_eq!(state.unload_prompt, UnloadPrompt::None);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_cancels(effects, LEASE_TIMER);
            })
            .run();
    }

    #[test]
    fn test_unmount_after_unload_does_not_release_again() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .given_actions(vec![CheckoutAction::PageUnloading])
            .when_action(CheckoutAction::Unmounted)
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_cancels(effects, LEASE_TIMER);
            })
            .run();
    }

    #[test]
    fn test_unmount_releases_without_navigation() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .when_action(CheckoutAction::Unmounted)
            .then_state(|state| {
                assert!(state.lease.release_state().is_in_flight());
                assert!(state.pending_exit.is_none());
                assert!(state.navigation.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_purchase_suppresses_and_disables_button() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .when_action(CheckoutAction::PurchaseRequested)
            .then_state(|state| {
                assert_eq!(state.lease.release_state(), ReleaseState::Suppressed);
                assert!(!state.checkout_enabled());
                assert!(state.is_settling());
                assert_eq!(
                    state.purchase.request().unwrap().specific_ticket_ids,
                    vec![TicketId::new("a"), TicketId::new("b")]
                );
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_double_click_issues_one_purchase() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .given_actions(vec![CheckoutAction::PurchaseRequested])
            .when_action(CheckoutAction::PurchaseRequested)
            .then_state(|state| assert_eq!(state.purchase.attempts(), 1))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_paid_purchase_navigates_to_payment() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .given_actions(vec![CheckoutAction::PurchaseRequested])
            .when_action(CheckoutAction::PurchaseSucceeded {
                response: PurchaseResponse::paid("https://pay.example/s/42"),
            })
            .then_state(|state| {
                assert_eq!(
                    state.navigation,
                    Some(Navigation::ExternalPayment {
                        checkout_url: "https://pay.example/s/42".into()
                    })
                );
                assert_eq!(
                    state.outcome,
                    Some(CheckoutOutcome::Purchased {
                        is_free: false,
                        checkout_url: Some("https://pay.example/s/42".into())
                    })
                );
                assert!(!state.timer.is_running());
            })
            .then_effects(|effects| assertions::assert_cancels(effects, LEASE_TIMER))
            .run();
    }

    #[test]
    fn test_missing_checkout_url_reenables_button_and_stays_suppressed() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .given_actions(vec![CheckoutAction::PurchaseRequested])
            .when_action(CheckoutAction::PurchaseSucceeded {
                response: PurchaseResponse {
                    is_free: false,
                    checkout_url: None,
                },
            })
            .then_state(|state| {
                assert_eq!(state.last_error, Some(CheckoutError::MissingCheckoutUrl));
                assert!(state.checkout_enabled());
                assert!(state.navigation.is_none());
                assert_eq!(state.lease.release_state(), ReleaseState::Suppressed);
                assert!(state.timer.is_running());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_purchase_response_after_unload_is_ignored() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(mounted())
            .given_actions(vec![
                CheckoutAction::PurchaseRequested,
                CheckoutAction::PageUnloading,
            ])
            .when_action(CheckoutAction::PurchaseSucceeded {
                response: PurchaseResponse::free(),
            })
            .then_state(|state| {
                assert!(state.navigation.is_none());
                assert!(state.outcome.is_none());
                assert!(!state.purchase.is_in_flight());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_expiry_during_purchase_redirects_without_release() {
        let mut state = CheckoutState::new(lease().with_expiry_seconds(1));
        state.page = PagePhase::Mounted;
        state.timer.start();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .given_actions(vec![CheckoutAction::PurchaseRequested])
            .when_action(CheckoutAction::Tick)
            .then_state(|state| {
                assert_eq!(state.lease.release_state(), ReleaseState::Suppressed);
                assert!(matches!(state.navigation, Some(Navigation::EventPage { .. })));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
