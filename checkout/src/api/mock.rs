//! In-memory reservation service for development and testing.
//!
//! [`MockReservationApi`] counts every call and records every purchase
//! request, so tests can assert "released at most once" and "purchased the
//! reserved tickets" directly. Results can be scripted per call.

use super::{ApiFuture, BeaconData, BeaconSender, PurchaseRequest, PurchaseResponse, ReservationApi};
use crate::error::ApiError;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock reservation service (succeeds unless told otherwise)
#[derive(Debug)]
pub struct MockReservationApi {
    latency: Duration,
    release_calls: AtomicUsize,
    purchase_calls: AtomicUsize,
    release_failure: Mutex<Option<ApiError>>,
    purchase_results: Mutex<VecDeque<Result<PurchaseResponse, ApiError>>>,
    default_purchase: Mutex<PurchaseResponse>,
    purchase_requests: Mutex<Vec<PurchaseRequest>>,
}

impl MockReservationApi {
    /// Creates a mock that releases successfully and answers purchases as free
    #[must_use]
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            release_calls: AtomicUsize::new(0),
            purchase_calls: AtomicUsize::new(0),
            release_failure: Mutex::new(None),
            purchase_results: Mutex::new(VecDeque::new()),
            default_purchase: Mutex::new(PurchaseResponse::free()),
            purchase_requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates an Arc-wrapped instance for sharing with an environment
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Delay every call by `latency` (uses the tokio timer)
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every release call fail with `error`
    #[must_use]
    pub fn with_release_failure(self, error: ApiError) -> Self {
        *lock(&self.release_failure) = Some(error);
        self
    }

    /// Answer purchases with `response` once scripted results run out
    #[must_use]
    pub fn with_purchase_response(self, response: PurchaseResponse) -> Self {
        *lock(&self.default_purchase) = response;
        self
    }

    /// Script the result of the next purchase call
    pub fn push_purchase_result(&self, result: Result<PurchaseResponse, ApiError>) {
        lock(&self.purchase_results).push_back(result);
    }

    /// Number of release calls received
    #[must_use]
    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Number of purchase calls received
    #[must_use]
    pub fn purchase_calls(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    /// Every purchase request received, in order
    #[must_use]
    pub fn purchase_requests(&self) -> Vec<PurchaseRequest> {
        lock(&self.purchase_requests).clone()
    }

    fn delay(&self) -> Option<Duration> {
        (!self.latency.is_zero()).then_some(self.latency)
    }
}

impl Default for MockReservationApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationApi for MockReservationApi {
    fn release_reservations(&self) -> ApiFuture<()> {
        let call = self.release_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failure = lock(&self.release_failure).clone();
        let delay = self.delay();

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            tracing::info!(call, failed = failure.is_some(), "Mock release processed");
            failure.map_or(Ok(()), Err)
        })
    }

    fn release_beacon_data(&self) -> BeaconData {
        BeaconData {
            url: "mock://reservations/release".to_string(),
            payload: json!({ "source": "beacon" }),
        }
    }

    fn purchase(&self, request: PurchaseRequest) -> ApiFuture<PurchaseResponse> {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.purchase_requests).push(request.clone());

        let result = lock(&self.purchase_results)
            .pop_front()
            .unwrap_or_else(|| Ok(lock(&self.default_purchase).clone()));
        let delay = self.delay();

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            tracing::info!(
                event_id = %request.event_id,
                tickets = request.specific_ticket_ids.len(),
                ok = result.is_ok(),
                "Mock purchase processed"
            );
            result
        })
    }
}

/// Beacon sender that records what it was asked to send
#[derive(Debug)]
pub struct RecordingBeacon {
    accept: bool,
    sent: Mutex<Vec<BeaconData>>,
}

impl RecordingBeacon {
    /// Creates a beacon that accepts everything
    #[must_use]
    pub const fn new() -> Self {
        Self {
            accept: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Creates a beacon that refuses to queue anything
    #[must_use]
    pub const fn refusing() -> Self {
        Self {
            accept: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Number of beacons handed to this sender
    #[must_use]
    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Beacons handed to this sender, in order
    #[must_use]
    pub fn sent(&self) -> Vec<BeaconData> {
        lock(&self.sent).clone()
    }
}

impl Default for RecordingBeacon {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconSender for RecordingBeacon {
    fn send_beacon(&self, beacon: BeaconData) -> bool {
        lock(&self.sent).push(beacon);
        self.accept
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::EventId;

    fn request() -> PurchaseRequest {
        PurchaseRequest {
            event_id: EventId::new(),
            tickets: Vec::new(),
            specific_ticket_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_release_counts_calls() {
        let api = MockReservationApi::new();
        api.release_reservations().await.unwrap();
        api.release_reservations().await.unwrap();
        assert_eq!(api.release_calls(), 2);
    }

    #[tokio::test]
    async fn test_release_failure_is_returned() {
        let api = MockReservationApi::new().with_release_failure(ApiError::Timeout);
        assert_eq!(api.release_reservations().await, Err(ApiError::Timeout));
        assert_eq!(api.release_calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_purchase_results_come_first() {
        let api = MockReservationApi::new().with_purchase_response(PurchaseResponse::paid("https://pay"));
        api.push_purchase_result(Err(ApiError::Transport("connection reset".into())));

        assert!(api.purchase(request()).await.is_err());
        assert_eq!(
            api.purchase(request()).await.unwrap(),
            PurchaseResponse::paid("https://pay")
        );
        assert_eq!(api.purchase_calls(), 2);
        assert_eq!(api.purchase_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_uses_tokio_time() {
        let api = MockReservationApi::new().with_latency(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        api.release_reservations().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_recording_beacon() {
        let beacon = RecordingBeacon::refusing();
        assert!(!beacon.send_beacon(MockReservationApi::new().release_beacon_data()));
        assert_eq!(beacon.sent_count(), 1);
    }
}
