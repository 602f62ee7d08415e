//! Detector trait + registry.

use std::sync::Arc;

use crate::insight::Insight;
use crate::types::{Block, Transaction};

/// A stateless strategy that derives insights from chain data.
///
/// Implementations must be pure functions of their input and their own
/// immutable configuration, and must return an empty vector (never panic)
/// for input they cannot interpret.
pub trait Detector: Send + Sync {
    /// Human-readable detector name, used in logs.
    fn name(&self) -> &str;

    /// Called once per delivered block.
    fn on_block(&self, block: &Block) -> Vec<Insight>;

    /// Called once per transaction, after its block. Defaults to no insights.
    fn on_transaction(&self, _tx: &Transaction) -> Vec<Insight> {
        Vec::new()
    }
}

/// Ordered set of registered detectors.
///
/// Insights are returned in registration order, then in each detector's own
/// output order.
#[derive(Default, Clone)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector; it runs after every previously registered one.
    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Names of the registered detectors, in order.
    pub fn names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Run every detector over a block.
    pub fn detect_block(&self, block: &Block) -> Vec<Insight> {
        self.detectors.iter().flat_map(|d| d.on_block(block)).collect()
    }

    /// Run every detector over a transaction.
    pub fn detect_transaction(&self, tx: &Transaction) -> Vec<Insight> {
        self.detectors
            .iter()
            .flat_map(|d| d.on_transaction(tx))
            .collect()
    }
}
