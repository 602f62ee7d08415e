//! tronostr-core — the observation → detection → publication pipeline core.
//!
//! # Architecture
//!
//! ```text
//! BlockSource → Watcher ──(WatcherSink)──► Dispatcher
//!                  │                          ├── DetectorRegistry (Detector…)
//!                  └── Cursor                 └── InsightSink (e.g. Publisher)
//! ```
//!
//! Chain-specific sources and detectors live in `tronostr-tron`; the relay
//! publisher lives in `tronostr-nostr`.

pub mod cursor;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod insight;
pub mod types;
pub mod watcher;

pub use cursor::Cursor;
pub use detector::{Detector, DetectorRegistry};
pub use dispatch::{Dispatcher, InsightSink};
pub use error::{DetectorError, WatcherError};
pub use insight::{Insight, InsightType, Severity, Tag};
pub use types::{Block, Operation, Transaction};
pub use watcher::{BlockSource, PollOutcome, Watcher, WatcherConfig, WatcherHandle, WatcherSink, WatcherState};
