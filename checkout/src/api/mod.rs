//! Reservation service client.
//!
//! The coordinator talks to the backend reservation/inventory service through
//! [`ReservationApi`] and to the unload-time delivery mechanism through
//! [`BeaconSender`]. Both are injected through the environment:
//!
//! - [`http`]: reqwest-backed implementations for a real deployment
//! - [`mock`]: in-memory doubles that count calls, for tests and the demo

pub mod http;
pub mod mock;

use crate::error::ApiResult;
use crate::types::{EventId, ReservationLease, TicketId, TicketTypeId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

pub use http::{HttpBeaconSender, HttpReservationApi};
pub use mock::{MockReservationApi, RecordingBeacon};

/// Boxed future returned by [`ReservationApi`] calls
pub type ApiFuture<T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send>>;

/// Quantity of one ticket type in a purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseTicket {
    /// Ticket type (tier)
    pub ticket_type_id: TicketTypeId,
    /// Number of tickets
    pub quantity: u32,
}

/// Body of the purchase call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Event being purchased
    pub event_id: EventId,
    /// Per-type quantities
    pub tickets: Vec<PurchaseTicket>,
    /// The exact tickets reserved under the lease
    pub specific_ticket_ids: Vec<TicketId>,
}

impl PurchaseRequest {
    /// Snapshot a lease into a purchase request
    ///
    /// `specific_ticket_ids` is the flattened list of reserved identifiers;
    /// it is never recomputed from quantities.
    #[must_use]
    pub fn from_lease(lease: &ReservationLease) -> Self {
        Self {
            event_id: lease.event_id,
            tickets: lease
                .line_items()
                .iter()
                .map(|item| PurchaseTicket {
                    ticket_type_id: item.ticket_type_id,
                    quantity: item.quantity,
                })
                .collect(),
            specific_ticket_ids: lease.reserved_ticket_ids(),
        }
    }
}

/// Successful purchase response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    /// `true` when the order total is zero
    pub is_free: bool,
    /// Payment page for paid orders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

impl PurchaseResponse {
    /// Response for a zero-total order
    #[must_use]
    pub const fn free() -> Self {
        Self {
            is_free: true,
            checkout_url: None,
        }
    }

    /// Response for a paid order
    #[must_use]
    pub fn paid(checkout_url: impl Into<String>) -> Self {
        Self {
            is_free: false,
            checkout_url: Some(checkout_url.into()),
        }
    }
}

/// Unload-time release payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconData {
    /// Absolute URL to post to
    pub url: String,
    /// JSON body carrying the same meaning as a release call
    pub payload: serde_json::Value,
}

/// Operations of the reservation service used during checkout
///
/// Implementations are bound to one event and the caller's session.
pub trait ReservationApi: Send + Sync {
    /// Release every ticket reserved for this session and event
    ///
    /// Idempotent: releasing when nothing is reserved is not an error.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`](crate::error::ApiError) if the call fails.
    fn release_reservations(&self) -> ApiFuture<()>;

    /// Data for a best-effort release sent while the page is torn down
    fn release_beacon_data(&self) -> BeaconData;

    /// Purchase the reserved tickets
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`](crate::error::ApiError) if the call fails or the
    /// response cannot be decoded.
    fn purchase(&self, request: PurchaseRequest) -> ApiFuture<PurchaseResponse>;
}

/// Best-effort, non-blocking delivery of a small payload
pub trait BeaconSender: Send + Sync {
    /// Queue the beacon; returns `false` if it could not even be queued
    ///
    /// Called from inside the unload reduction, so it must return without
    /// waiting for delivery. A queued beacon must outlive the caller's runtime.
    fn send_beacon(&self, beacon: BeaconData) -> bool;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{LineItem, Money};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_purchase_request_wire_format() {
        let event_id = EventId::from_uuid(Uuid::nil());
        let ticket_type_id = TicketTypeId::from_uuid(Uuid::nil());
        let lease = ReservationLease::new(
            event_id,
            vec![LineItem::new(
                ticket_type_id,
                2,
                Money::from_dollars(50),
                [TicketId::new("t-2"), TicketId::new("t-1")],
            )],
            Utc::now(),
        )
        .unwrap();

        let request = PurchaseRequest::from_lease(&lease);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "eventId": Uuid::nil(),
                "tickets": [{ "ticketTypeId": Uuid::nil(), "quantity": 2 }],
                "specificTicketIds": ["t-1", "t-2"],
            })
        );
    }

    #[test]
    fn test_purchase_response_decoding() {
        let free: PurchaseResponse = serde_json::from_str(r#"{"isFree":true}"#).unwrap();
        assert_eq!(free, PurchaseResponse::free());

        let paid: PurchaseResponse =
            serde_json::from_str(r#"{"isFree":false,"checkoutUrl":"https://pay.example/s/1"}"#)
                .unwrap();
        assert_eq!(paid, PurchaseResponse::paid("https://pay.example/s/1"));
    }
}
