//! Navigation targets produced by the coordinator.
//!
//! The coordinator never touches a router; it only decides where the page
//! should go. [`crate::config::RouteConfig`] turns a target into a path.

use crate::types::EventId;
use serde::{Deserialize, Serialize};

/// Where the page goes next
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Navigation {
    /// Back to the event's page (cancel or timeout)
    EventPage {
        /// Event being checked out
        event_id: EventId,
    },
    /// Confirmation page for a zero-total order
    FreeConfirmation {
        /// Event being checked out
        event_id: EventId,
    },
    /// External payment page returned by the purchase call
    ExternalPayment {
        /// Absolute URL of the payment page
        checkout_url: String,
    },
}

/// Confirmation the page may ask for while unloading
///
/// Only a generic "are you sure" prompt is allowed; the page never explains
/// what happens to the reservation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnloadPrompt {
    /// Let the page go
    #[default]
    None,
    /// Ask the browser for its standard leave-page confirmation
    Generic,
}
