//! Checkout Lease Demo
//!
//! Drives one checkout page against the in-memory reservation service and
//! prints what the page does for a chosen scenario.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin checkout-demo -- purchase   # paid order, external payment page
//! cargo run --bin checkout-demo -- free       # zero total, confirmation page
//! cargo run --bin checkout-demo -- cancel     # back to event, one release
//! cargo run --bin checkout-demo -- timeout    # countdown runs out
//! cargo run --bin checkout-demo -- unload     # purchase started, then tab closed
//! cargo run --bin checkout-demo -- retry      # failed purchase, retried with the same tickets
//! ```

use anyhow::{Context, bail};
use checkout_lease::{
    ApiError, CheckoutConfig, CheckoutPage, EventId, LineItem, Money, PurchaseResponse,
    ReservationLease, TicketId, TicketTypeId,
    api::{MockReservationApi, RecordingBeacon},
};
use lease_core::environment::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    Purchase,
    Free,
    Cancel,
    Timeout,
    Unload,
    Retry,
}

impl Scenario {
    fn parse(arg: Option<&str>) -> anyhow::Result<Self> {
        Ok(match arg.unwrap_or("purchase") {
            "purchase" => Self::Purchase,
            "free" => Self::Free,
            "cancel" => Self::Cancel,
            "timeout" => Self::Timeout,
            "unload" => Self::Unload,
            "retry" => Self::Retry,
            other => bail!("unknown scenario {other:?}"),
        })
    }
}

fn reserved_lease(clock: &dyn Clock) -> anyhow::Result<ReservationLease> {
    // 2 × $50 (type X) + 1 × $30 (type Y)
    let lease = ReservationLease::new(
        EventId::new(),
        vec![
            LineItem::new(
                TicketTypeId::new(),
                2,
                Money::from_dollars(50),
                [TicketId::new("X-0001"), TicketId::new("X-0002")],
            ),
            LineItem::new(
                TicketTypeId::new(),
                1,
                Money::from_dollars(30),
                [TicketId::new("Y-0417")],
            ),
        ],
        clock.now(),
    )
    .context("reservation produced an invalid lease")?;
    Ok(lease)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,checkout_lease=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let scenario = Scenario::parse(std::env::args().nth(1).as_deref())?;

    let mut config = CheckoutConfig::from_env();
    if scenario == Scenario::Timeout {
        config.lease.seconds = config.lease.seconds.min(5);
    }

    let api = Arc::new(
        MockReservationApi::new()
            .with_latency(Duration::from_millis(250))
            .with_purchase_response(PurchaseResponse::paid("https://payments.example/session/demo")),
    );
    if scenario == Scenario::Free {
        api.push_purchase_result(Ok(PurchaseResponse::free()));
    }
    if scenario == Scenario::Retry {
        api.push_purchase_result(Err(ApiError::Transport("connection reset by peer".into())));
    }
    let beacon = Arc::new(RecordingBeacon::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let lease = reserved_lease(clock.as_ref())?;
    println!("\n🎫 Checkout for event {}", lease.event_id);
    println!("   {} tickets, total {}", lease.ticket_count(), lease.total());

    let page = CheckoutPage::new(lease, &config, clock, api.clone(), beacon.clone());
    page.mount().await?;
    println!("   Time left: {}", page.remaining_display().await);

    match scenario {
        Scenario::Purchase | Scenario::Free => {
            let route = page.purchase().await?;
            println!("➡️  Navigate to {}", route.as_deref().unwrap_or("<nowhere>"));
        },
        Scenario::Cancel => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            println!("   Time left: {}", page.remaining_display().await);
            let route = page.back_to_event().await?;
            println!("➡️  Navigate to {}", route.as_deref().unwrap_or("<nowhere>"));
            page.unmount().await?;
        },
        Scenario::Timeout => {
            let wait = Duration::from_secs(config.lease.seconds + 2) + config.api.request_timeout();
            let route = page.wait_for_navigation(wait).await?;
            println!("⏰ Lease expired ({})", page.remaining_display().await);
            println!("➡️  Navigate to {route}");
        },
        Scenario::Unload => {
            let purchase = {
                let page = page.clone();
                tokio::spawn(async move { page.purchase().await })
            };
            tokio::time::sleep(Duration::from_millis(50)).await;
            let prompt = page.before_unload().await;
            println!("🚪 Tab closed while purchasing (prompt: {prompt:?})");
            let route = purchase.await??;
            println!("   Late purchase response followed: {}", route.is_some());
        },
        Scenario::Retry => {
            let first = page.purchase().await?;
            if let (None, Some(error)) = (first, page.last_error().await) {
                println!("❌ {error}");
            }
            println!("   Checkout enabled again: {}", page.checkout_enabled().await);
            let route = page.purchase().await?;
            println!("➡️  Navigate to {}", route.as_deref().unwrap_or("<nowhere>"));
        },
    }

    println!("\n📊 Summary");
    println!("   Release state:   {}", page.release_state().await);
    println!("   Outcome:         {:?}", page.outcome().await);
    println!("   Release calls:   {}", api.release_calls());
    println!("   Beacons sent:    {}", beacon.sent_count());
    println!("   Purchase calls:  {}", api.purchase_calls());

    Ok(())
}
