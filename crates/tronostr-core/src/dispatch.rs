//! Dispatcher — connects the watcher's output to the detectors and forwards
//! every resulting insight to an [`InsightSink`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::detector::DetectorRegistry;
use crate::error::WatcherError;
use crate::insight::Insight;
use crate::types::{Block, Transaction};
use crate::watcher::WatcherSink;

/// Consumer of insights (normally the relay publisher).
///
/// `publish` must not block: implementations queue or drop, they never wait
/// on the network.
pub trait InsightSink: Send + Sync {
    fn publish(&self, insight: Insight);
}

impl<T: InsightSink + ?Sized> InsightSink for Arc<T> {
    fn publish(&self, insight: Insight) {
        (**self).publish(insight)
    }
}

/// Runs every registered detector for each block and transaction.
pub struct Dispatcher<P> {
    detectors: DetectorRegistry,
    sink: P,
    published: u64,
}

impl<P: InsightSink> Dispatcher<P> {
    pub fn new(detectors: DetectorRegistry, sink: P) -> Self {
        Self {
            detectors,
            sink,
            published: 0,
        }
    }

    /// Number of insights forwarded so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    fn forward(&mut self, insights: Vec<Insight>) {
        for insight in insights {
            tracing::info!(
                insight_type = %insight.insight_type,
                severity = %insight.severity,
                content = %insight.content,
                "Insight"
            );
            self.sink.publish(insight);
            self.published += 1;
        }
    }
}

#[async_trait]
impl<P: InsightSink> WatcherSink for Dispatcher<P> {
    async fn on_block(&mut self, block: &Block) -> Result<(), WatcherError> {
        tracing::info!(height = block.height, txs = block.transaction_count(), "New TRON block");
        let insights = self.detectors.detect_block(block);
        self.forward(insights);
        Ok(())
    }

    async fn on_transaction(&mut self, tx: &Transaction) -> Result<(), WatcherError> {
        let insights = self.detectors.detect_transaction(tx);
        self.forward(insights);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;
    use crate::insight::{InsightType, Severity};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Insight>>);

    impl InsightSink for Collect {
        fn publish(&self, insight: Insight) {
            self.0.lock().unwrap().push(insight);
        }
    }

    struct PerBlockAndTx;

    impl Detector for PerBlockAndTx {
        fn name(&self) -> &str {
            "both"
        }
        fn on_block(&self, block: &Block) -> Vec<Insight> {
            vec![Insight::new(InsightType::TronBlock, block.timestamp, Severity::Info, json!(block.height))]
        }
        fn on_transaction(&self, tx: &Transaction) -> Vec<Insight> {
            vec![Insight::new(
                InsightType::TrxTransfer,
                tx.timestamp.unwrap_or_default(),
                Severity::Medium,
                json!(tx.hash),
            )]
        }
    }

    #[tokio::test]
    async fn forwards_block_then_transaction_insights() {
        let mut registry = DetectorRegistry::new();
        registry.register(Arc::new(PerBlockAndTx));

        let sink = Arc::new(Collect::default());
        let mut dispatcher = Dispatcher::new(registry, Arc::clone(&sink));

        let tx = Transaction {
            hash: "t1".into(),
            timestamp: Some(9),
            operations: vec![],
        };
        let block = Block {
            height: 3,
            hash: "b3".into(),
            timestamp: 9,
            producer: "41".into(),
            transactions: vec![tx.clone()],
        };

        dispatcher.on_block(&block).await.unwrap();
        dispatcher.on_transaction(&tx).await.unwrap();

        let got = sink.0.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].insight_type, InsightType::TronBlock);
        assert_eq!(got[1].content, json!("t1"));
        assert_eq!(dispatcher.published(), 2);
    }
}
