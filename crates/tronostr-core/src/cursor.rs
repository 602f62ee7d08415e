//! Watcher cursor — the last block height delivered downstream.

use serde::{Deserialize, Serialize};

/// The watcher's position in the chain.
///
/// `0` means "not yet seeded"; the first observed head seeds it so the
/// watcher starts from the current tip instead of replaying history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    last_processed: u64,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last height that was successfully delivered.
    pub fn last_processed(&self) -> u64 {
        self.last_processed
    }

    pub fn is_seeded(&self) -> bool {
        self.last_processed != 0
    }

    /// Seed from the first observed head so that `head` is the next height.
    pub fn seed(&mut self, head: u64) {
        if !self.is_seeded() {
            self.last_processed = head.saturating_sub(1);
        }
    }

    /// The next height to deliver.
    pub fn next_height(&self) -> u64 {
        self.last_processed + 1
    }

    /// Mark `height` delivered. Only the next height in sequence is accepted.
    pub fn advance(&mut self, height: u64) -> bool {
        if height == self.next_height() {
            self.last_processed = height;
            true
        } else {
            false
        }
    }

    /// Heights still to deliver up to and including `head`.
    pub fn pending(&self, head: u64) -> std::ops::RangeInclusive<u64> {
        self.next_height()..=head
    }
}
