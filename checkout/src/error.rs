//! Error types for the checkout lease coordinator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for reservation service calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Failure talking to the reservation service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connection or request could not be completed
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status
    #[error("reservation service returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// The response body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The request did not finish within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Anything else (client construction, scripted mock failures)
    #[error("{0}")]
    Other(String),
}

/// Error shown on the checkout page
///
/// Release failures never become a `CheckoutError`; they are logged only.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutError {
    /// The purchase call failed; the user may retry with the same tickets
    #[error("purchase failed: {0}")]
    Purchase(String),

    /// A paid order came back without a payment redirect; not retried automatically
    #[error("purchase response is missing the payment checkout URL")]
    MissingCheckoutUrl,
}

impl CheckoutError {
    /// Returns `true` if the error came from a failed call rather than a malformed success
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Purchase(_))
    }
}
