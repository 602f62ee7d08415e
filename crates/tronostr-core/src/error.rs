//! Error types for the watch/detect pipeline.

use thiserror::Error;

/// Errors surfaced by the watcher and its block source.
///
/// None of these stop the watcher; they are logged, reported to the sink and
/// the next poll cycle retries naturally. Transient errors log at `warn`,
/// the rest at `error`.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Block source error: {0}")]
    Source(String),

    #[error("Block {height} not available from source")]
    BlockUnavailable { height: u64 },

    #[error("Malformed block data: {0}")]
    Decode(String),
}

impl WatcherError {
    /// Returns `true` if retrying on the next poll may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Source(_) | Self::BlockUnavailable { .. })
    }
}

/// Errors raised while building a detector from its configuration.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Invalid detector config: {0}")]
    InvalidConfig(String),
}
