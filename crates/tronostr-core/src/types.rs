//! Chain data shared by the watcher and the detectors.

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A fetched block. Immutable once handed to the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height (≥ 1).
    pub height: u64,
    /// Block hash (block ID).
    pub hash: String,
    /// Block timestamp in milliseconds since epoch.
    pub timestamp: i64,
    /// Producer (witness) address as reported by the node.
    pub producer: String,
    /// Transactions in on-chain order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Number of transactions in the block.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A transaction inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash (txID).
    pub hash: String,
    /// Timestamp in milliseconds; filled from the block when the node omits it.
    pub timestamp: Option<i64>,
    /// Operation records (TRON "contracts"), in order.
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Sets `timestamp` to `fallback` when the transaction carries none.
    pub fn inherit_timestamp(&mut self, fallback: i64) {
        if self.timestamp.is_none() {
            self.timestamp = Some(fallback);
        }
    }
}

// ─── Operation ────────────────────────────────────────────────────────────────

/// A single operation record within a transaction.
///
/// Only the shapes a detector inspects are typed; everything else is kept as
/// [`Operation::Other`] with its contract type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    /// Native TRX transfer. `amount` is in sun.
    Transfer {
        owner_address: String,
        to_address: String,
        amount: i64,
    },
    /// Smart contract call.
    TriggerSmartContract {
        owner_address: String,
        contract_address: String,
        /// ABI call data, hex without `0x`.
        data: Option<String>,
        call_value: Option<i64>,
    },
    /// Any other (or undecodable) contract type.
    Other { kind: String },
}

impl Operation {
    /// The TRON contract type name of this operation.
    pub fn kind(&self) -> &str {
        match self {
            Self::Transfer { .. } => "TransferContract",
            Self::TriggerSmartContract { .. } => "TriggerSmartContract",
            Self::Other { kind } => kind,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
