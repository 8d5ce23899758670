//! HTTP implementations of the reservation service client.

use super::{ApiFuture, BeaconData, BeaconSender, PurchaseRequest, PurchaseResponse, ReservationApi};
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::types::EventId;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use tokio::sync::mpsc;

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

fn build_client(config: &ApiConfig) -> ApiResult<Client> {
    Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| ApiError::Other(format!("failed to build HTTP client: {e}")))
}

fn authorize(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Reservation service over JSON/HTTP, bound to one event
///
/// - `POST {base}/events/{eventId}/reservations/release`
/// - `POST {base}/events/{eventId}/purchase`
#[derive(Clone, Debug)]
pub struct HttpReservationApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    event_id: EventId,
}

impl HttpReservationApi {
    /// Creates a client for `event_id`
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Other`] if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig, event_id: EventId) -> ApiResult<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            event_id,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/events/{}/{path}", self.base_url, self.event_id)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        authorize(self.client.post(self.endpoint(path)), self.token.as_deref())
    }
}

impl ReservationApi for HttpReservationApi {
    fn release_reservations(&self) -> ApiFuture<()> {
        let request = self.post("reservations/release");
        let event_id = self.event_id;

        Box::pin(async move {
            let response = request.send().await?;
            check_status(response).await?;
            tracing::debug!(event_id = %event_id, "Reservations released");
            Ok(())
        })
    }

    fn release_beacon_data(&self) -> BeaconData {
        BeaconData {
            url: self.endpoint("reservations/release"),
            payload: json!({ "eventId": self.event_id }),
        }
    }

    fn purchase(&self, request: PurchaseRequest) -> ApiFuture<PurchaseResponse> {
        let builder = self.post("purchase").json(&request);

        Box::pin(async move {
            let response = check_status(builder.send().await?).await?;
            let body = response.json::<PurchaseResponse>().await?;
            Ok(body)
        })
    }
}

/// Fire-and-forget release delivery for page unload
///
/// Beacons are handed to a dedicated delivery thread with its own runtime, so
/// a queued beacon is still sent after the page's runtime is gone. The thread
/// drains the queue and exits once every handle to the sender is dropped.
#[derive(Clone, Debug)]
pub struct HttpBeaconSender {
    queue: mpsc::UnboundedSender<BeaconData>,
}

impl HttpBeaconSender {
    /// Creates a beacon sender sharing the API timeout and credentials
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Other`] if the HTTP client, the delivery runtime or
    /// the delivery thread cannot be created.
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let client = build_client(config)?;
        let token = config.token.clone();
        let (queue, mut beacons) = mpsc::unbounded_channel::<BeaconData>();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::Other(format!("failed to build beacon runtime: {e}")))?;

        std::thread::Builder::new()
            .name("checkout-beacon".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(beacon) = beacons.recv().await {
                        deliver(&client, token.as_deref(), beacon).await;
                    }
                });
            })
            .map_err(|e| ApiError::Other(format!("failed to start beacon thread: {e}")))?;

        Ok(Self { queue })
    }
}

async fn deliver(client: &Client, token: Option<&str>, beacon: BeaconData) {
    let request = authorize(client.post(&beacon.url).json(&beacon.payload), token);

    match request.send().await {
        Ok(response) => {
            tracing::debug!(url = %beacon.url, status = %response.status(), "Beacon delivered");
        },
        Err(error) => tracing::debug!(url = %beacon.url, error = %error, "Beacon lost"),
    }
}

impl BeaconSender for HttpBeaconSender {
    fn send_beacon(&self, beacon: BeaconData) -> bool {
        match self.queue.send(beacon) {
            Ok(()) => true,
            Err(mpsc::error::SendError(beacon)) => {
                tracing::warn!(url = %beacon.url, "Beacon delivery thread is gone");
                false
            },
        }
    }
}
