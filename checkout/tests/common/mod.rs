//! Shared fixtures for checkout integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use checkout_lease::api::{MockReservationApi, RecordingBeacon};
use checkout_lease::{
    CheckoutConfig, CheckoutPage, EventId, LineItem, Money, ReservationLease, TicketId,
    TicketTypeId,
};
use lease_core::environment::Clock;
use lease_testing::test_clock;
use std::sync::Arc;

/// Scenario A selection: 2 × $50 (type X) and 1 × $30 (type Y)
pub fn scenario_lease() -> ReservationLease {
    ReservationLease::new(
        EventId::new(),
        vec![
            LineItem::new(
                TicketTypeId::new(),
                2,
                Money::from_dollars(50),
                [TicketId::new("X-1"), TicketId::new("X-2")],
            ),
            LineItem::new(
                TicketTypeId::new(),
                1,
                Money::from_dollars(30),
                [TicketId::new("Y-1")],
            ),
        ],
        test_clock().now(),
    )
    .unwrap()
}

pub struct Harness {
    pub page: CheckoutPage,
    pub api: Arc<MockReservationApi>,
    pub beacon: Arc<RecordingBeacon>,
    pub event_id: EventId,
}

impl Harness {
    pub fn new(api: MockReservationApi) -> Self {
        Self::with_lease(api, scenario_lease())
    }

    pub fn with_lease(api: MockReservationApi, lease: ReservationLease) -> Self {
        lease_testing::init_test_tracing();

        let api = Arc::new(api);
        let beacon = Arc::new(RecordingBeacon::new());
        let event_id = lease.event_id;
        let page = CheckoutPage::new(
            lease,
            &CheckoutConfig::default(),
            Arc::new(test_clock()),
            api.clone(),
            beacon.clone(),
        );

        Self {
            page,
            api,
            beacon,
            event_id,
        }
    }

    /// Releases by either transport
    pub fn releases(&self) -> usize {
        self.api.release_calls() + self.beacon.sent_count()
    }

    pub fn event_page(&self) -> String {
        format!("/events/{}", self.event_id)
    }
}
