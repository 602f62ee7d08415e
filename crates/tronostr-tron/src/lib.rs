//! tronostr-tron — TRON-specific pieces of the TRONostr pipeline.
//!
//! - [`address`]: hex ⇄ base58check address codec
//! - [`fetcher`]: [`TronGridClient`], a `BlockSource` over the full-node HTTP API
//! - [`detectors`]: [`BlockMetricsDetector`] and [`WhaleTransferDetector`]

pub mod address;
pub mod detectors;
pub mod fetcher;

pub use detectors::{BlockMetricsDetector, WhaleTransferConfig, WhaleTransferDetector};
pub use fetcher::{TronGridClient, TronGridConfig};

/// Value of the `chain` tag on every TRON insight.
pub const CHAIN: &str = "tron";
