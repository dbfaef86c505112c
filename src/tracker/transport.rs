// src/tracker/transport.rs — Fire-and-forget event delivery
//
// Each event is one JSON POST. The beacon path queues the request and
// returns at once; if it cannot even queue, the keepalive path hands the
// request to a detached worker. Nothing is retried or awaited, and no
// failure reaches the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::infra::errors::TrackerError;
use crate::tracker::event::Event;

/// Delivery mechanism behind `EventTransport`.
///
/// Sinks are called while the tracker's state lock is held, so an
/// implementation must never call back into `Tracker`; doing so deadlocks.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Queue `body` for delivery. `false` means it could not be queued.
    fn send_beacon(&self, url: &str, body: &str) -> bool;

    /// Fallback delivery that must outlive the caller's teardown.
    fn send_keepalive(&self, url: &str, body: &str);
}

#[derive(Clone)]
pub struct EventTransport {
    url: String,
    sink: Arc<dyn EventSink>,
}

impl EventTransport {
    pub fn new(url: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            url: url.into(),
            sink,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send(&self, event: &Event) {
        let body = match event.to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(kind = event.kind(), "Dropping event that failed to serialize: {}", e);
                return;
            }
        };

        if self.sink.send_beacon(&self.url, &body) {
            tracing::trace!(kind = event.kind(), page_view = event.page_view_id(), "Event queued");
            return;
        }

        tracing::debug!(
            kind = event.kind(),
            "Beacon refused, falling back to keepalive request"
        );
        self.sink.send_keepalive(&self.url, &body);
    }
}

/// reqwest-backed sink.
#[derive(Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpSink {
    pub fn new(timeout: Duration) -> Result<Self, TrackerError> {
        Ok(Self {
            client: build_client()?,
            timeout,
        })
    }

    /// Awaitable delivery, for callers that want to wait for the status line.
    pub async fn deliver(&self, url: &str, body: String) -> Result<(), TrackerError> {
        post_event(&self.client, url, body, self.timeout).await
    }
}

impl EventSink for HttpSink {
    /// Spawns onto the ambient tokio runtime. Refuses when there is none.
    fn send_beacon(&self, url: &str, body: &str) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        let client = self.client.clone();
        let url = url.to_string();
        let body = body.to_string();
        let timeout = self.timeout;

        handle.spawn(async move {
            if let Err(e) = post_event(&client, &url, body, timeout).await {
                tracing::warn!("Event delivery to {} failed: {}", url, e);
            }
        });
        true
    }

    /// Detached thread with its own runtime and client, so delivery does not
    /// depend on the caller's runtime staying alive.
    fn send_keepalive(&self, url: &str, body: &str) {
        let url = url.to_string();
        let body = body.to_string();
        let timeout = self.timeout;

        let spawned = std::thread::Builder::new()
            .name("pagepulse-keepalive".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::warn!("Keepalive runtime unavailable: {}", e);
                        return;
                    }
                };
                runtime.block_on(async move {
                    let result = match build_client() {
                        Ok(client) => post_event(&client, &url, body, timeout).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        tracing::warn!("Keepalive delivery to {} failed: {}", url, e);
                    }
                });
            });

        if let Err(e) = spawned {
            tracing::warn!("Could not start keepalive worker: {}", e);
        }
    }
}

fn build_client() -> Result<reqwest::Client, TrackerError> {
    let client = reqwest::Client::builder()
        .user_agent(format!("pagepulse/{}", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// POST one event. The response body is never read past the status line.
async fn post_event(
    client: &reqwest::Client,
    url: &str,
    body: String,
    timeout: Duration,
) -> Result<(), TrackerError> {
    let resp = client
        .post(url)
        .header("content-type", "application/json")
        .body(body)
        .timeout(timeout)
        .send()
        .await?;

    let status = resp.status();
    if status.is_success() {
        tracing::trace!("Collector accepted event (HTTP {})", status.as_u16());
    } else {
        tracing::debug!("Collector returned HTTP {}, ignoring", status.as_u16());
    }
    Ok(())
}

/// How a recorded payload was handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Beacon,
    Keepalive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub url: String,
    pub body: String,
    pub channel: Channel,
}

/// Sink that keeps every payload in memory.
#[derive(Default)]
pub struct MemorySink {
    deliveries: Mutex<Vec<Delivery>>,
    refuse_beacons: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_beacons(&self, refuse: bool) {
        self.refuse_beacons.store(refuse, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Recorded payloads decoded back into events. Undecodable bodies are skipped.
    pub fn events(&self) -> Vec<Event> {
        self.deliveries()
            .iter()
            .filter_map(|d| serde_json::from_str(&d.body).ok())
            .collect()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .map(|mut d| d.drain(..).collect())
            .unwrap_or_default()
    }

    fn record(&self, url: &str, body: &str, channel: Channel) {
        if let Ok(mut d) = self.deliveries.lock() {
            d.push(Delivery {
                url: url.to_string(),
                body: body.to_string(),
                channel,
            });
        }
    }
}

impl EventSink for MemorySink {
    fn send_beacon(&self, url: &str, body: &str) -> bool {
        if self.refuse_beacons.load(Ordering::SeqCst) {
            return false;
        }
        self.record(url, body, Channel::Beacon);
        true
    }

    fn send_keepalive(&self, url: &str, body: &str) {
        self.record(url, body, Channel::Keepalive);
    }
}
