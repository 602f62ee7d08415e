//! The block watcher — a gap-free, strictly increasing block stream from a
//! polled source.
//!
//! # Poll cycle
//! 1. Fetch the chain head `H`. On failure report it and go to 4.
//! 2. On the very first poll, seed the cursor to `H - 1` (start from "now").
//! 3. Fetch and deliver every height in `(cursor, H]` one at a time, in order.
//!    A failed fetch or delivery aborts the rest of the batch; the cursor
//!    stays on the last delivered height and the next cycle resumes there.
//! 4. Sleep `poll_interval_ms` and repeat while running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::error::WatcherError;
use crate::types::{Block, Transaction};

// ─── Collaborator traits ──────────────────────────────────────────────────────

/// Where blocks come from (an RPC node, a fixture, …).
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Current chain head height.
    async fn current_height(&self) -> Result<u64, WatcherError>;

    /// Fetch the block at `height`.
    async fn block(&self, height: u64) -> Result<Block, WatcherError>;
}

/// Receives the watcher's ordered output.
///
/// Deliveries are awaited inline: a slow sink stalls the watcher rather than
/// letting blocks pile up in an unbounded buffer.
#[async_trait]
pub trait WatcherSink: Send {
    /// A new block, delivered in strictly increasing height order.
    async fn on_block(&mut self, block: &Block) -> Result<(), WatcherError>;

    /// One of the block's transactions, in on-chain order, after `on_block`.
    async fn on_transaction(&mut self, tx: &Transaction) -> Result<(), WatcherError>;

    /// A non-fatal failure, already logged by the watcher. `height` is set
    /// when a specific block failed.
    fn on_error(&mut self, _height: Option<u64>, _error: &WatcherError) {}
}

// ─── Config / state ───────────────────────────────────────────────────────────

/// Watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Delay between poll cycles (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
        }
    }
}

/// Runtime state of the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatcherState {
    Stopped,
    Running,
}

impl std::fmt::Display for WatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Result of a single poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Head observed this cycle (`None` if the head fetch failed).
    pub head: Option<u64>,
    /// Blocks delivered this cycle.
    pub delivered: u64,
    /// Height whose fetch or delivery aborted the batch.
    pub failed_at: Option<u64>,
}

/// Cloneable stop switch for a running [`Watcher`].
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
}

impl WatcherHandle {
    /// Request a cooperative stop. The current unit of work completes first.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Watcher stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ─── Watcher ──────────────────────────────────────────────────────────────────

/// Polls a [`BlockSource`] and feeds a [`WatcherSink`].
///
/// The watcher exclusively owns its [`Cursor`]; nothing else can move it.
pub struct Watcher<S> {
    source: S,
    config: WatcherConfig,
    cursor: Cursor,
    running: Arc<AtomicBool>,
    looping: bool,
}

impl<S: BlockSource> Watcher<S> {
    pub fn new(source: S, config: WatcherConfig) -> Self {
        Self {
            source,
            config,
            cursor: Cursor::new(),
            running: Arc::new(AtomicBool::new(false)),
            looping: false,
        }
    }

    /// A handle that can stop the loop from another task.
    pub fn handle(&self) -> WatcherHandle {
        WatcherHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Current cursor (read-only copy).
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn state(&self) -> WatcherState {
        if self.running.load(Ordering::SeqCst) {
            WatcherState::Running
        } else {
            WatcherState::Stopped
        }
    }

    /// Run poll cycles until stopped through a [`WatcherHandle`].
    ///
    /// Returns immediately if the watcher is already running.
    pub async fn start<K>(&mut self, sink: &mut K)
    where
        K: WatcherSink + ?Sized,
    {
        if self.looping {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        self.looping = true;

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        tracing::info!(poll_interval_ms = self.config.poll_interval_ms, "Watcher started");

        while self.running.load(Ordering::SeqCst) {
            self.poll_once(sink).await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        self.looping = false;
        tracing::info!(
            last_processed = self.cursor.last_processed(),
            "Watcher stopped"
        );
    }

    /// Run exactly one poll cycle (steps 1–3), without the trailing sleep.
    pub async fn poll_once<K>(&mut self, sink: &mut K) -> PollOutcome
    where
        K: WatcherSink + ?Sized,
    {
        let head = match self.source.current_height().await {
            Ok(h) => h,
            Err(e) => {
                report(sink, None, self.cursor.last_processed(), &e);
                return PollOutcome::default();
            }
        };

        self.cursor.seed(head);

        let mut outcome = PollOutcome {
            head: Some(head),
            ..Default::default()
        };

        for height in self.cursor.pending(head) {
            if self.looping && !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.deliver(height, sink).await {
                report(sink, Some(height), self.cursor.last_processed(), &e);
                outcome.failed_at = Some(height);
                break;
            }
            self.cursor.advance(height);
            outcome.delivered += 1;
        }

        outcome
    }

    async fn deliver<K>(&self, height: u64, sink: &mut K) -> Result<(), WatcherError>
    where
        K: WatcherSink + ?Sized,
    {
        let mut block = self.source.block(height).await?;
        if block.height != height {
            return Err(WatcherError::Decode(format!(
                "requested block {height}, source returned {}",
                block.height
            )));
        }

        let timestamp = block.timestamp;
        for tx in &mut block.transactions {
            tx.inherit_timestamp(timestamp);
        }

        tracing::debug!(
            height,
            hash = %block.hash,
            txs = block.transaction_count(),
            "New block"
        );

        sink.on_block(&block).await?;
        for tx in &block.transactions {
            sink.on_transaction(tx).await?;
        }
        Ok(())
    }
}

/// Log a poll failure once, then hand it to the sink.
fn report<K>(sink: &mut K, height: Option<u64>, last_processed: u64, error: &WatcherError)
where
    K: WatcherSink + ?Sized,
{
    if error.is_transient() {
        tracing::warn!(height, last_processed, error = %error, "Watcher poll failed, retrying next cycle");
    } else {
        tracing::error!(height, last_processed, error = %error, "Watcher poll failed, retrying next cycle");
    }
    sink.on_error(height, error);
}
