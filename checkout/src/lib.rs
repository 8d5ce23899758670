//! Checkout Lease - the reservation lease coordinator for a ticket checkout page
//!
//! Tickets are reserved upstream before the checkout page opens. From then on
//! the page holds a time-bounded *lease* on them and must either purchase
//! them or hand them back, never both and never twice. This crate implements
//! that protocol on top of the `lease-core` reducer/effect model:
//!
//! - **Lease Timer** ([`timer`]): 600-second countdown, exactly one expiry
//! - **Release Trigger Arbiter** ([`arbiter`]): the single state machine that
//!   decides whether a release may go out
//! - **Navigation-Release Adapter** ([`coordinator`]): maps cancel, timeout,
//!   unload and teardown onto release requests and navigation targets
//! - **Purchase Finalizer** ([`finalizer`]): suppresses release, purchases the
//!   exact reserved tickets, maps the response to a route
//!
//! # Architecture
//!
//! ```text
//!   mount ──▶ LeaseTimer ──expiry──┐
//!   back to event ─────────────────┤
//!   page unload (beacon) ──────────┼──▶ ReleaseArbiter ──Dispatch──▶ ReservationApi::release_*
//!   unmount ───────────────────────┘          ▲
//!   checkout button ──▶ PurchaseFinalizer ──suppress──┘ ──▶ ReservationApi::purchase
//! ```
//!
//! ```text
//! Release state:
//!   Active ──request_release──▶ ReleaseInFlight ──complete──▶ Released
//!     └──────── suppress (purchase began) ─────────────────▶ Suppressed
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let page = CheckoutPage::new(lease, &config, clock, api, beacon);
//! page.mount().await?;
//! if let Some(route) = page.purchase().await? {
//!     router.push(route);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod arbiter;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod finalizer;
pub mod navigation;
pub mod page;
pub mod timer;
pub mod types;

pub use api::{BeaconData, BeaconSender, PurchaseRequest, PurchaseResponse, ReservationApi};
pub use arbiter::{ReleaseArbiter, ReleaseDecision, ReleaseReason, ReleaseState};
pub use config::CheckoutConfig;
pub use coordinator::{
    CheckoutAction, CheckoutEnvironment, CheckoutOutcome, CheckoutReducer, CheckoutState,
};
pub use error::{ApiError, CheckoutError};
pub use navigation::{Navigation, UnloadPrompt};
pub use page::CheckoutPage;
pub use timer::{LeaseTimer, TickOutcome};
pub use types::*;
