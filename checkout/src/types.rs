//! Domain types for the checkout lease.
//!
//! Identifiers, the cents-based [`Money`] value object, reserved line items and
//! the [`ReservationLease`] that the checkout page holds while the user decides.

use crate::arbiter::{ReleaseArbiter, ReleaseState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Default lease window in seconds
pub const DEFAULT_LEASE_SECONDS: u64 = 600;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket type (tier) of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketTypeId(Uuid);

impl TicketTypeId {
    /// Creates a new random `TicketTypeId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketTypeId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TicketTypeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of one physical ticket, as handed out by the reservation service
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wraps a ticket identifier returned by the reservation call
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from dollars, saturating at `u64::MAX` cents
    #[must_use]
    pub const fn from_dollars(dollars: u64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount in dollars (rounded down)
    #[must_use]
    pub const fn dollars(&self) -> u64 {
        self.0 / 100
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.dollars(), self.0 % 100)
    }
}

// ============================================================================
// Line items and the lease
// ============================================================================

/// One ticket type held under the lease
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Ticket type (tier)
    pub ticket_type_id: TicketTypeId,
    /// Number of tickets of this type
    pub quantity: u32,
    /// Price of one ticket
    pub unit_price: Money,
    /// Tickets the reservation call actually set aside for this type
    pub reserved_ticket_ids: BTreeSet<TicketId>,
}

impl LineItem {
    /// Creates a line item from the reservation response
    #[must_use]
    pub fn new(
        ticket_type_id: TicketTypeId,
        quantity: u32,
        unit_price: Money,
        reserved_ticket_ids: impl IntoIterator<Item = TicketId>,
    ) -> Self {
        Self {
            ticket_type_id,
            quantity,
            unit_price,
            reserved_ticket_ids: reserved_ticket_ids.into_iter().collect(),
        }
    }

    /// `unit_price × quantity`, or `None` on overflow
    #[must_use]
    pub const fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// Reasons a lease cannot be built from a reservation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaseError {
    /// Nothing was reserved
    #[error("lease has no line items")]
    Empty,

    /// A line item asks for zero tickets
    #[error("line item for ticket type {0} has zero quantity")]
    ZeroQuantity(TicketTypeId),

    /// The reserved identifiers do not match the requested quantity
    #[error(
        "ticket type {ticket_type_id} reserved {reserved} tickets but quantity is {quantity}"
    )]
    ReservedCountMismatch {
        /// Ticket type
        ticket_type_id: TicketTypeId,
        /// Requested quantity
        quantity: u32,
        /// Number of reserved identifiers
        reserved: usize,
    },

    /// The same physical ticket appears under two line items
    #[error("ticket {0} is reserved under more than one line item")]
    DuplicateTicket(TicketId),

    /// The order total does not fit in `u64` cents
    #[error("order total overflows")]
    TotalOverflow,
}

/// The client's in-memory record of a time-bounded ticket reservation
///
/// The release state lives inside the lease and is only changed through the
/// [`ReleaseArbiter`], so there is exactly one place that decides whether a
/// release may still happen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLease {
    /// Event being checked out
    pub event_id: EventId,
    line_items: Vec<LineItem>,
    created_at: DateTime<Utc>,
    /// Advisory lease window; the reservation service owns real expiry
    pub expires_in_seconds: u64,
    arbiter: ReleaseArbiter,
}

impl ReservationLease {
    /// Builds a lease from tickets already reserved upstream
    ///
    /// # Errors
    ///
    /// Returns a [`LeaseError`] when there are no line items, a line item has a
    /// zero quantity, the reserved identifiers do not match the quantity, a
    /// ticket is reserved twice, or the total overflows.
    pub fn new(
        event_id: EventId,
        line_items: Vec<LineItem>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LeaseError> {
        Self::validate(&line_items)?;

        Ok(Self {
            event_id,
            line_items,
            created_at,
            expires_in_seconds: DEFAULT_LEASE_SECONDS,
            arbiter: ReleaseArbiter::new(),
        })
    }

    /// Overrides the lease window
    #[must_use]
    pub fn with_expiry_seconds(mut self, seconds: u64) -> Self {
        self.expires_in_seconds = seconds;
        self
    }

    fn validate(line_items: &[LineItem]) -> Result<(), LeaseError> {
        if line_items.is_empty() {
            return Err(LeaseError::Empty);
        }

        let mut seen = BTreeSet::new();
        let mut total = Money::ZERO;
        for item in line_items {
            if item.quantity == 0 {
                return Err(LeaseError::ZeroQuantity(item.ticket_type_id));
            }

            if item.reserved_ticket_ids.len() != item.quantity as usize {
                return Err(LeaseError::ReservedCountMismatch {
                    ticket_type_id: item.ticket_type_id,
                    quantity: item.quantity,
                    reserved: item.reserved_ticket_ids.len(),
                });
            }

            for ticket in &item.reserved_ticket_ids {
                if !seen.insert(ticket) {
                    return Err(LeaseError::DuplicateTicket(ticket.clone()));
                }
            }

            total = item
                .subtotal()
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or(LeaseError::TotalOverflow)?;
        }

        Ok(())
    }

    /// Reserved line items, in selection order
    #[must_use]
    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    /// When the countdown started
    ///
    /// The reservation time until the page mounts, then the mount time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn start_countdown(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
    }

    /// Order total across all line items
    #[must_use]
    pub fn total(&self) -> Money {
        // Overflow is rejected at construction.
        self.line_items
            .iter()
            .filter_map(LineItem::subtotal)
            .fold(Money::ZERO, |acc, subtotal| {
                acc.checked_add(subtotal).unwrap_or(acc)
            })
    }

    /// Number of tickets held
    #[must_use]
    pub fn ticket_count(&self) -> u32 {
        self.line_items.iter().map(|item| item.quantity).sum()
    }

    /// Every reserved ticket identifier, line item by line item
    #[must_use]
    pub fn reserved_ticket_ids(&self) -> Vec<TicketId> {
        self.line_items
            .iter()
            .flat_map(|item| item.reserved_ticket_ids.iter().cloned())
            .collect()
    }

    /// Current release state
    #[must_use]
    pub const fn release_state(&self) -> ReleaseState {
        self.arbiter.state()
    }

    /// The arbiter guarding release for this lease
    #[must_use]
    pub const fn arbiter(&self) -> &ReleaseArbiter {
        &self.arbiter
    }

    pub(crate) fn arbiter_mut(&mut self) -> &mut ReleaseArbiter {
        &mut self.arbiter
    }
}
