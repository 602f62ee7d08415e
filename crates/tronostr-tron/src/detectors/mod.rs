//! Built-in TRON detectors.

pub mod block_metrics;
pub mod whale_transfer;

pub use block_metrics::BlockMetricsDetector;
pub use whale_transfer::{WhaleTransferConfig, WhaleTransferDetector};
