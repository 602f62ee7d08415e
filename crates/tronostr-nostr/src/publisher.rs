//! Rate-limited insight publisher.
//!
//! Insights are signed as soon as they arrive and placed on a bounded FIFO
//! queue. One drain task pops the oldest event, sends it to every connected
//! relay at once, then waits `60s / events_per_minute` before the next one.
//! Nothing is retried: a relay that fails an event simply misses it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use futures::future::join_all;
use nostr::{Event, Keys};
use serde::{Deserialize, Serialize};

use tronostr_core::dispatch::InsightSink;
use tronostr_core::insight::Insight;

use crate::event::{event_from_insight, DEFAULT_KIND_BASE};
use crate::relay::{Relay, RelayConfig, RelayConnector, WsConnector};

type Queue = Arc<Mutex<VecDeque<Event>>>;
type Relays = Arc<RwLock<Vec<Arc<dyn Relay>>>>;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Outbound rate and queue bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    #[serde(alias = "eventsPerMinute")]
    pub events_per_minute: u32,
    #[serde(alias = "queueSize")]
    pub queue_size: usize,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            events_per_minute: 60,
            queue_size: 1000,
        }
    }
}

impl RateLimit {
    /// Delay between two dequeues.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(self.events_per_minute.max(1)))
    }
}

/// Configuration for [`Publisher`].
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub relays: Vec<String>,
    /// First kind of the band; see [`kind_for`](crate::event::kind_for).
    pub kind_base: u16,
    pub rate_limit: RateLimit,
    /// Poll delay while the queue is empty or no relay is connected.
    pub idle_interval: Duration,
    pub relay: RelayConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            kind_base: DEFAULT_KIND_BASE,
            rate_limit: RateLimit::default(),
            idle_interval: Duration::from_millis(1000),
            relay: RelayConfig::default(),
        }
    }
}

/// Result of [`Publisher::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// The queue was full (or signing failed); the event was discarded.
    Dropped,
}

// ─── Publisher ────────────────────────────────────────────────────────────────

/// Signs insights and paces them out to the relay set.
pub struct Publisher {
    config: PublisherConfig,
    keys: Keys,
    connector: Arc<dyn RelayConnector>,
    queue: Queue,
    relays: Relays,
    running: Arc<AtomicBool>,
    draining: Arc<AtomicBool>,
}

impl Publisher {
    /// A publisher that connects over WebSocket.
    pub fn new(config: PublisherConfig, keys: Keys) -> Self {
        let connector = Arc::new(WsConnector::new(config.relay.clone()));
        Self::with_connector(config, keys, connector)
    }

    pub fn with_connector(
        config: PublisherConfig,
        keys: Keys,
        connector: Arc<dyn RelayConnector>,
    ) -> Self {
        Self {
            config,
            keys,
            connector,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            relays: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn public_key(&self) -> String {
        self.keys.public_key().to_hex()
    }

    /// Connect every configured relay, then start the drain loop.
    ///
    /// A relay that cannot be reached is logged and left out; this never
    /// fails as a whole. Relays that are already active are skipped, so a
    /// second call only retries the ones that failed. Returns the number of
    /// relays now active.
    pub async fn connect(&self) -> usize {
        for url in &self.config.relays {
            if self.is_active(url) {
                continue;
            }
            match self.connector.connect(url).await {
                Ok(relay) => {
                    tracing::info!(url = %url, "Publisher relay connected");
                    self.relays
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(relay);
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "Failed to connect to relay"),
            }
        }
        self.start();
        self.active_relays()
    }

    /// Start the drain loop if it is not already running.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }

        let rate = self.config.rate_limit;
        tracing::info!(
            events_per_minute = rate.events_per_minute,
            interval_ms = rate.interval().as_millis() as u64,
            "Publisher loop started"
        );
        tokio::spawn(drain_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.relays),
            Arc::clone(&self.running),
            Arc::clone(&self.draining),
            rate.interval(),
            self.config.idle_interval,
        ));
    }

    /// Sign `insight` and queue it. Never blocks and never fails.
    pub fn enqueue(&self, insight: &Insight) -> Enqueue {
        let event = match event_from_insight(insight, self.config.kind_base, &self.keys) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(insight_type = %insight.insight_type, error = %e, "Failed to sign event");
                return Enqueue::Dropped;
            }
        };

        let mut queue = self.lock_queue();
        if queue.len() >= self.config.rate_limit.queue_size {
            tracing::warn!(
                queue_len = queue.len(),
                kind = event.kind.as_u16(),
                "Publisher queue full, dropping event"
            );
            return Enqueue::Dropped;
        }
        tracing::debug!(kind = event.kind.as_u16(), id = %event.id, "event queued");
        queue.push_back(event);
        Enqueue::Queued
    }

    /// Ask the drain loop to exit after its current cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn active_relays(&self) -> usize {
        self.relays.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn is_active(&self, url: &str) -> bool {
        self.relays
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|relay| relay.url() == url)
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl InsightSink for Publisher {
    fn publish(&self, insight: Insight) {
        self.enqueue(&insight);
    }
}

// ─── Drain loop ───────────────────────────────────────────────────────────────

async fn drain_loop(
    queue: Queue,
    relays: Relays,
    running: Arc<AtomicBool>,
    draining: Arc<AtomicBool>,
    interval: Duration,
    idle: Duration,
) {
    loop {
        while running.load(Ordering::SeqCst) {
            let active: Vec<Arc<dyn Relay>> =
                relays.read().unwrap_or_else(|e| e.into_inner()).clone();
            let next = if active.is_empty() {
                None
            } else {
                queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
            };

            match next {
                Some(event) => {
                    publish_all(&active, &event).await;
                    tokio::time::sleep(interval).await;
                }
                None => tokio::time::sleep(idle).await,
            }
        }

        // A start() between the running check and here either sees
        // `draining == false` and spawns its own loop, or has already flagged
        // `draining` and is left to this one.
        draining.store(false, Ordering::SeqCst);
        if !running.load(Ordering::SeqCst) || draining.swap(true, Ordering::SeqCst) {
            break;
        }
    }
    tracing::info!("Publisher loop stopped");
}

async fn publish_all(relays: &[Arc<dyn Relay>], event: &Event) {
    let results = join_all(
        relays
            .iter()
            .map(|relay| async move { (relay.url(), relay.publish(event).await) }),
    )
    .await;

    for (url, result) in results {
        match result {
            Ok(()) => tracing::debug!(url, id = %event.id, kind = event.kind.as_u16(), "event published"),
            Err(e) => tracing::warn!(url, id = %event.id, error = %e, "Failed to publish to relay"),
        }
    }
}
