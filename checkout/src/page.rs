//! The checkout page as a host would drive it.
//!
//! [`CheckoutPage`] owns a [`Store`] for one lease and exposes the page's
//! signals as async methods. Methods that trigger a network call wait until
//! the page has settled (the release or purchase resolved) and return the
//! resolved route, so a host can navigate without inspecting state.

use crate::api::{BeaconSender, ReservationApi};
use crate::arbiter::ReleaseState;
use crate::config::{CheckoutConfig, RouteConfig};
use crate::coordinator::{
    CheckoutAction, CheckoutEnvironment, CheckoutOutcome, CheckoutReducer, CheckoutState,
};
use crate::error::CheckoutError;
use crate::navigation::UnloadPrompt;
use crate::types::ReservationLease;
use lease_core::environment::Clock;
use lease_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Store type driving a checkout page
pub type CheckoutStore = Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;

/// A mounted-or-mountable checkout page for one lease
#[derive(Clone)]
pub struct CheckoutPage {
    store: CheckoutStore,
    routes: RouteConfig,
    settle_timeout: Duration,
}

impl CheckoutPage {
    /// Creates the page for `lease` using `config` for timing and routes
    ///
    /// The lease window is taken from `config.lease.seconds`.
    #[must_use]
    pub fn new(
        lease: ReservationLease,
        config: &CheckoutConfig,
        clock: Arc<dyn Clock>,
        api: Arc<dyn ReservationApi>,
        beacon: Arc<dyn BeaconSender>,
    ) -> Self {
        let lease = lease.with_expiry_seconds(config.lease.seconds);
        let environment = CheckoutEnvironment::new(clock, api, beacon)
            .with_tick_interval(config.lease.tick_interval());

        Self {
            store: Store::new(CheckoutState::new(lease), CheckoutReducer::new(), environment),
            routes: config.routes.clone(),
            // One full request plus slack for the feedback reduction.
            settle_timeout: config.api.request_timeout() + Duration::from_secs(1),
        }
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &CheckoutStore {
        &self.store
    }

    /// Mount the page and start the countdown
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`CheckoutPage::unmount`].
    pub async fn mount(&self) -> Result<(), StoreError> {
        self.store.send(CheckoutAction::Mounted).await
    }

    /// "Back to event": release, then return the event page route
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is shut down or the release call
    /// does not resolve within the settle timeout.
    pub async fn back_to_event(&self) -> Result<Option<String>, StoreError> {
        self.send_and_settle(CheckoutAction::BackToEvent).await?;
        Ok(self.navigation().await)
    }

    /// Checkout button: purchase, then return the route to follow (if any)
    ///
    /// `Ok(None)` means the attempt failed or was ignored; see
    /// [`CheckoutPage::last_error`].
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is shut down or the purchase
    /// call does not resolve within the settle timeout.
    pub async fn purchase(&self) -> Result<Option<String>, StoreError> {
        self.send_and_settle(CheckoutAction::PurchaseRequested).await?;
        Ok(self.navigation().await)
    }

    /// Browser unload signal; returns the confirmation to request
    ///
    /// After [`CheckoutPage::unmount`] the lease is already settled, so the
    /// signal is a no-op and no prompt is requested.
    pub async fn before_unload(&self) -> UnloadPrompt {
        match self.store.send(CheckoutAction::PageUnloading).await {
            Ok(()) => self.store.state(|s| s.unload_prompt).await,
            Err(error) => {
                tracing::debug!(error = %error, "Unload signal after teardown ignored");
                UnloadPrompt::None
            },
        }
    }

    /// In-app teardown: stop the timer, release if still held, shut the store down
    ///
    /// Waits for an outstanding release call to be issued and resolve; its
    /// completion is dropped because the page is gone.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store was already shut down or
    /// outstanding calls outlive the settle timeout.
    pub async fn unmount(&self) -> Result<(), StoreError> {
        self.store.send(CheckoutAction::Unmounted).await?;
        self.store.shutdown(self.settle_timeout).await
    }

    /// Wait until the page has somewhere to go, e.g. after the lease expired
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if nothing was decided within `timeout`.
    pub async fn wait_for_navigation(&self, timeout: Duration) -> Result<String, StoreError> {
        let mut rx = self.store.subscribe_actions();

        tokio::time::timeout(timeout, async {
            loop {
                if let Some(route) = self.navigation().await {
                    return Ok(route);
                }
                match rx.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => {},
                    Err(RecvError::Closed) => return Err(StoreError::ChannelClosed),
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Resolved route, once the page decided where to go
    pub async fn navigation(&self) -> Option<String> {
        self.store
            .state(|s| s.navigation.as_ref().map(|n| self.routes.resolve(n)))
            .await
    }

    /// Remaining lease time as `M:SS`
    pub async fn remaining_display(&self) -> String {
        self.store.state(|s| s.timer.display()).await
    }

    /// Release state of the lease
    pub async fn release_state(&self) -> ReleaseState {
        self.store.state(|s| s.lease.release_state()).await
    }

    /// Whether the checkout button is enabled
    pub async fn checkout_enabled(&self) -> bool {
        self.store.state(CheckoutState::checkout_enabled).await
    }

    /// Error shown next to the checkout button
    pub async fn last_error(&self) -> Option<CheckoutError> {
        self.store.state(|s| s.last_error.clone()).await
    }

    /// Latest outcome
    pub async fn outcome(&self) -> Option<CheckoutOutcome> {
        self.store.state(|s| s.outcome.clone()).await
    }

    async fn send_and_settle(&self, action: CheckoutAction) -> Result<(), StoreError> {
        let mut rx = self.store.subscribe_actions();
        self.store.send(action).await?;

        tokio::time::timeout(self.settle_timeout, async {
            loop {
                if !self.store.state(CheckoutState::is_settling).await {
                    return Ok(());
                }
                match rx.recv().await {
                    Ok(_) => {},
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Checkout page observer lagged");
                    },
                    Err(RecvError::Closed) => return Err(StoreError::ChannelClosed),
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }
}
