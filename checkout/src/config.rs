//! Configuration management for the checkout page.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Binaries call `dotenvy::dotenv()` first so a local `.env` file is honoured.

use crate::navigation::Navigation;
use crate::types::DEFAULT_LEASE_SECONDS;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Placeholder replaced by the event id in route templates
const EVENT_ID_PLACEHOLDER: &str = "{event_id}";

/// Checkout configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Reservation service client
    pub api: ApiConfig,
    /// Lease countdown
    pub lease: LeaseConfig,
    /// In-app routes the coordinator navigates to
    pub routes: RouteConfig,
}

/// Reservation service client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://localhost:8080/api`
    pub base_url: String,
    /// Bearer token for the caller's session
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    /// Per-request timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Lease countdown configuration
///
/// `seconds` must match the reservation service's TTL; otherwise the page can
/// believe it holds tickets the server already gave back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Lease window in seconds
    pub seconds: u64,
    /// Length of one countdown tick in milliseconds
    pub tick_millis: u64,
}

impl LeaseConfig {
    /// Length of one countdown tick
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

/// Route templates; `{event_id}` is substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Event page
    pub event_page: String,
    /// Free order confirmation page
    pub free_confirmation: String,
}

impl RouteConfig {
    /// Render a navigation target to a path (or absolute URL for payment)
    #[must_use]
    pub fn resolve(&self, navigation: &Navigation) -> String {
        match navigation {
            Navigation::EventPage { event_id } => self
                .event_page
                .replace(EVENT_ID_PLACEHOLDER, &event_id.to_string()),
            Navigation::FreeConfirmation { event_id } => self
                .free_confirmation
                .replace(EVENT_ID_PLACEHOLDER, &event_id.to_string()),
            Navigation::ExternalPayment { checkout_url } => checkout_url.clone(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api: ApiConfig {
                base_url: lookup("CHECKOUT_API_BASE_URL")
                    .unwrap_or_else(|| "http://localhost:8080/api".to_string()),
                token: lookup("CHECKOUT_API_TOKEN").filter(|token| !token.is_empty()),
                request_timeout_secs: lookup("CHECKOUT_REQUEST_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            },
            lease: LeaseConfig {
                seconds: lookup("CHECKOUT_LEASE_SECONDS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LEASE_SECONDS),
                tick_millis: lookup("CHECKOUT_TICK_MILLIS")
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|millis| *millis > 0)
                    .unwrap_or(1000),
            },
            routes: RouteConfig {
                event_page: lookup("CHECKOUT_EVENT_PAGE_PATH")
                    .unwrap_or_else(|| "/events/{event_id}".to_string()),
                free_confirmation: lookup("CHECKOUT_FREE_CONFIRMATION_PATH")
                    .unwrap_or_else(|| "/events/{event_id}/confirmation".to_string()),
            },
        }
    }
}
