//! Large TRX / USDT transfer detection.
//!
//! Native transfers are read from `TransferContract` records. USDT transfers
//! are `TriggerSmartContract` calls to the configured token contract whose
//! call data is a TRC-20 `transfer(address,uint256)`:
//!
//! ```text
//! a9059cbb | 000…0 (24 hex) | recipient (40 hex) | amount (64 hex)
//! 0        8                32                   72               136
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;

use tronostr_core::detector::Detector;
use tronostr_core::error::DetectorError;
use tronostr_core::insight::{Insight, InsightType, Severity};
use tronostr_core::types::{Block, Operation, Transaction};

use crate::address;
use crate::CHAIN;

/// `transfer(address,uint256)` selector.
pub const TRANSFER_SELECTOR: &str = "a9059cbb";

/// USDT (TRC-20) on mainnet.
pub const USDT_MAINNET: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

const CALL_DATA_LEN: usize = 136;

/// Thresholds are in whole tokens (after dividing by `base_unit_divisor`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhaleTransferConfig {
    #[serde(alias = "trxThreshold")]
    pub trx_threshold: f64,
    #[serde(alias = "usdtThreshold")]
    pub usdt_threshold: f64,
    /// Token contract, base58 (`T…`) or hex (`41…`).
    #[serde(alias = "usdtContract")]
    pub usdt_contract: String,
    /// Amounts at or above `threshold * high_multiplier` are `high`.
    #[serde(alias = "highMultiplier")]
    pub high_multiplier: f64,
    /// Raw integer amount per whole token (sun per TRX, 10^6 for USDT).
    #[serde(alias = "baseUnitDivisor")]
    pub base_unit_divisor: f64,
}

impl Default for WhaleTransferConfig {
    fn default() -> Self {
        Self {
            trx_threshold: 1_000_000.0,
            usdt_threshold: 500_000.0,
            usdt_contract: USDT_MAINNET.into(),
            high_multiplier: 10.0,
            base_unit_divisor: 1_000_000.0,
        }
    }
}

/// Flags TRX and USDT transfers above the configured thresholds.
#[derive(Debug, Clone)]
pub struct WhaleTransferDetector {
    config: WhaleTransferConfig,
    /// `usdt_contract` normalized to lowercase hex.
    usdt_contract_hex: String,
}

impl WhaleTransferDetector {
    pub fn new(config: WhaleTransferConfig) -> Result<Self, DetectorError> {
        let usdt_contract_hex = address::to_hex(&config.usdt_contract)
            .map_err(|e| DetectorError::InvalidConfig(format!("usdt_contract: {e}")))?;
        if config.base_unit_divisor <= 0.0 {
            return Err(DetectorError::InvalidConfig(
                "base_unit_divisor must be positive".into(),
            ));
        }
        Ok(Self {
            config,
            usdt_contract_hex,
        })
    }

    fn native_transfer(&self, tx: &Transaction, from: &str, to: &str, raw: i64) -> Option<Insight> {
        let amount = raw as f64 / self.config.base_unit_divisor;
        let severity = Severity::for_magnitude(
            amount,
            self.config.trx_threshold,
            self.config.high_multiplier,
        )?;
        Some(self.insight(InsightType::TrxTransfer, "TRX", tx, severity, from, to, amount))
    }

    fn token_transfer(&self, tx: &Transaction, from: &str, contract: &str, data: &str) -> Option<Insight> {
        if !contract.eq_ignore_ascii_case(&self.usdt_contract_hex) {
            return None;
        }
        let (to_hex, raw) = decode_transfer_call(data)?;
        let to = address::to_base58(&to_hex).ok()?;
        let amount = raw as f64 / self.config.base_unit_divisor;
        let severity = Severity::for_magnitude(
            amount,
            self.config.usdt_threshold,
            self.config.high_multiplier,
        )?;
        Some(self.insight(InsightType::UsdtTransfer, "USDT", tx, severity, from, &to, amount))
    }

    #[allow(clippy::too_many_arguments)]
    fn insight(
        &self,
        insight_type: InsightType,
        asset: &str,
        tx: &Transaction,
        severity: Severity,
        from: &str,
        to: &str,
        amount: f64,
    ) -> Insight {
        let timestamp = tx
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        Insight::new(
            insight_type,
            timestamp,
            severity,
            json!({
                "from": address::display(from),
                "to": address::display(to),
                "amount": amount,
                "asset": asset,
                "hash": tx.hash,
            }),
        )
        .tag("chain", CHAIN)
        .tag("asset", asset)
        .tag("type", "whale_transfer")
        .tag("severity", severity.as_str())
    }
}

impl Detector for WhaleTransferDetector {
    fn name(&self) -> &str {
        "WhaleTransferDetector"
    }

    fn on_block(&self, _block: &Block) -> Vec<Insight> {
        Vec::new()
    }

    fn on_transaction(&self, tx: &Transaction) -> Vec<Insight> {
        tx.operations
            .iter()
            .filter_map(|op| match op {
                Operation::Transfer {
                    owner_address,
                    to_address,
                    amount,
                } => self.native_transfer(tx, owner_address, to_address, *amount),
                Operation::TriggerSmartContract {
                    owner_address,
                    contract_address,
                    data: Some(data),
                    ..
                } => self.token_transfer(tx, owner_address, contract_address, data),
                _ => None,
            })
            .collect()
    }
}

/// Decode TRC-20 `transfer` call data into (recipient hex `41…`, raw amount).
///
/// Returns `None` for any other selector or malformed data.
pub fn decode_transfer_call(data: &str) -> Option<(String, u128)> {
    let data = data.strip_prefix("0x").unwrap_or(data);
    if data.len() < CALL_DATA_LEN || !data.get(..8)?.eq_ignore_ascii_case(TRANSFER_SELECTOR) {
        return None;
    }
    let recipient = data.get(32..72)?;
    if !recipient.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let amount = u128::from_str_radix(data.get(72..CALL_DATA_LEN)?, 16).ok()?;
    Some((format!("41{}", recipient.to_ascii_lowercase()), amount))
}
