//! Purchase Finalizer.
//!
//! Turns the lease into a purchase request and maps the response onto a
//! navigation target. Beginning an attempt suppresses release on the lease
//! before anything goes over the wire.

use crate::api::{PurchaseRequest, PurchaseResponse};
use crate::error::CheckoutError;
use crate::navigation::Navigation;
use crate::types::{EventId, ReservationLease};
use serde::{Deserialize, Serialize};

/// Whether a purchase call is outstanding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchasePhase {
    /// The checkout button may be used
    #[default]
    Ready,
    /// Waiting for the purchase response; the button is disabled
    InFlight,
}

/// Purchase attempts made for one lease
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseFinalizer {
    phase: PurchasePhase,
    request: Option<PurchaseRequest>,
    attempts: u32,
}

impl PurchaseFinalizer {
    /// Creates a finalizer with no attempt made
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: PurchasePhase::Ready,
            request: None,
            attempts: 0,
        }
    }

    /// Start an attempt
    ///
    /// Suppresses release on the lease, then returns the request to send. The
    /// request is captured from the lease on the first attempt and reused
    /// unchanged for every retry. Returns `None` while an attempt is in flight.
    pub fn begin(&mut self, lease: &mut ReservationLease) -> Option<PurchaseRequest> {
        if self.is_in_flight() {
            return None;
        }

        lease.arbiter_mut().suppress();

        let request = self
            .request
            .get_or_insert_with(|| PurchaseRequest::from_lease(lease))
            .clone();

        self.phase = PurchasePhase::InFlight;
        self.attempts += 1;
        Some(request)
    }

    /// Resolve the outstanding attempt
    ///
    /// Returns `None` when no attempt is in flight (a stale response).
    pub fn complete(
        &mut self,
        event_id: EventId,
        result: Result<PurchaseResponse, String>,
    ) -> Option<Result<Navigation, CheckoutError>> {
        if !self.is_in_flight() {
            return None;
        }

        self.phase = PurchasePhase::Ready;
        Some(resolve(event_id, result))
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> PurchasePhase {
        self.phase
    }

    /// Returns `true` while a purchase call is outstanding
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self.phase, PurchasePhase::InFlight)
    }

    /// The captured purchase request, once an attempt was made
    #[must_use]
    pub const fn request(&self) -> Option<&PurchaseRequest> {
        self.request.as_ref()
    }

    /// Number of attempts started
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn resolve(
    event_id: EventId,
    result: Result<PurchaseResponse, String>,
) -> Result<Navigation, CheckoutError> {
    match result {
        Ok(PurchaseResponse { is_free: true, .. }) => Ok(Navigation::FreeConfirmation { event_id }),
        Ok(PurchaseResponse {
            is_free: false,
            checkout_url: Some(checkout_url),
        }) if !checkout_url.is_empty() => Ok(Navigation::ExternalPayment { checkout_url }),
        Ok(_) => Err(CheckoutError::MissingCheckoutUrl),
        Err(error) => Err(CheckoutError::Purchase(error)),
    }
}
