use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::models::{BookingStatus, QueueEvent};
use crate::services::queue;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-carwash-signature";
pub const EVENT_HEADER: &str = "x-carwash-event";

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &QueueEvent) -> anyhow::Result<()>;
}

/// Feeds the admin event stream.
pub struct BroadcastSink {
    tx: broadcast::Sender<QueueEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<QueueEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn publish(&self, event: &QueueEvent) -> anyhow::Result<()> {
        // No subscribers is not an error
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// POSTs each event as JSON to a configured URL.
pub struct WebhookSink {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String, secret: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook client")?;
        Ok(Self { url, secret, client })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn publish(&self, event: &QueueEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event).context("failed to encode event")?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, event.name());
        if !self.secret.is_empty() {
            request = request.header(SIGNATURE_HEADER, sign(&self.secret, &body));
        }

        request
            .body(body)
            .send()
            .await
            .context("failed to deliver webhook")?
            .error_for_status()
            .context("webhook endpoint returned error")?;

        Ok(())
    }
}

/// Base64 HMAC-SHA1 of the request body.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match Hmac::<Sha1>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Hands `event` to every sink. Failures are logged and dropped.
pub async fn dispatch(sinks: &[Box<dyn NotificationSink>], event: &QueueEvent) {
    for sink in sinks {
        if let Err(e) = sink.publish(event).await {
            tracing::error!(error = %e, event = event.name(), "failed to publish notification");
        }
    }
}

/// Snapshots the current queue and publishes it, followed by one booking's
/// new status if given, from a background task. Callers never wait on sinks.
pub fn announce(state: &Arc<AppState>, changed: Option<(String, BookingStatus)>) -> JoinHandle<()> {
    let mut events = Vec::with_capacity(2);

    let snapshot = state
        .conn()
        .and_then(|conn| queue::current_queue(&conn, &state.config.queue));
    match snapshot {
        Ok(queue) => events.push(QueueEvent::QueueUpdated { queue }),
        Err(e) => tracing::error!(error = %e, "failed to load queue for broadcast"),
    }

    if let Some((booking_number, status)) = changed {
        events.push(QueueEvent::BookingStatusChanged {
            booking_number,
            status,
        });
    }

    let state = Arc::clone(state);
    tokio::spawn(async move {
        for event in &events {
            dispatch(&state.notifiers, event).await;
        }
    })
}
