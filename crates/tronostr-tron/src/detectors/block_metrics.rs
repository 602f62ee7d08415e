//! One `info` insight per block with basic block statistics.

use serde_json::json;

use tronostr_core::detector::Detector;
use tronostr_core::insight::{Insight, InsightType, Severity};
use tronostr_core::types::Block;

use crate::address;
use crate::CHAIN;

/// Emits exactly one `TRON_BLOCK` insight per block; ignores transactions.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockMetricsDetector;

impl BlockMetricsDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for BlockMetricsDetector {
    fn name(&self) -> &str {
        "BlockMetricsDetector"
    }

    fn on_block(&self, block: &Block) -> Vec<Insight> {
        let insight = Insight::new(
            InsightType::TronBlock,
            block.timestamp,
            Severity::Info,
            json!({
                "height": block.height,
                "hash": block.hash,
                "transactionCount": block.transaction_count(),
                "producer": address::display(&block.producer),
            }),
        )
        .tag("chain", CHAIN)
        .tag("type", "block_metrics");

        vec![insight]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tronostr_core::types::Transaction;

    fn block(txs: usize) -> Block {
        Block {
            height: 62_000_001,
            hash: "00000000003b2e71".into(),
            timestamp: 1_717_000_003_000,
            producer: "411111111111111111111111111111111111111111".into(),
            transactions: (0..txs)
                .map(|i| Transaction {
                    hash: format!("tx{i}"),
                    timestamp: None,
                    operations: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn empty_block_yields_one_insight() {
        let insights = BlockMetricsDetector::new().on_block(&block(0));
        assert_eq!(insights.len(), 1);

        let i = &insights[0];
        assert_eq!(i.insight_type, InsightType::TronBlock);
        assert_eq!(i.severity, Severity::Info);
        assert_eq!(i.timestamp, 1_717_000_003_000);
        assert_eq!(i.content["transactionCount"], 0);
        assert_eq!(i.content["height"], 62_000_001u64);
        assert_eq!(i.content["producer"], "TBXSw8fM4jpQkGc6zZjsVABFpVN7UvXPdV");
    }

    #[test]
    fn tags_are_chain_and_type() {
        let insights = BlockMetricsDetector::new().on_block(&block(3));
        assert_eq!(insights[0].content["transactionCount"], 3);
        let tags: Vec<_> = insights[0]
            .tags
            .iter()
            .map(|t| (t.key(), t.value()))
            .collect();
        assert_eq!(tags, vec![("chain", "tron"), ("type", "block_metrics")]);
    }

    #[test]
    fn never_fires_on_transactions() {
        let tx = Transaction {
            hash: "t".into(),
            timestamp: Some(1),
            operations: vec![],
        };
        assert!(BlockMetricsDetector::new().on_transaction(&tx).is_empty());
    }
}
