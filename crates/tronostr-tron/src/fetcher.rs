//! TronGrid HTTP block source.
//!
//! Uses the full-node HTTP API (`/wallet/getnowblock`, `/wallet/getblockbynum`)
//! and converts its JSON into [`Block`] values. Records the core does not
//! understand are kept as [`Operation::Other`] instead of failing the block.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tronostr_core::error::WatcherError;
use tronostr_core::types::{Block, Operation, Transaction};
use tronostr_core::watcher::BlockSource;

/// Header carrying the TronGrid API key.
pub const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

/// Configuration for [`TronGridClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TronGridConfig {
    /// Full-node base URL, e.g. `https://api.trongrid.io`.
    pub full_host: String,
    /// Optional TronGrid API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for TronGridConfig {
    fn default() -> Self {
        Self {
            full_host: "https://api.trongrid.io".into(),
            api_key: None,
            request_timeout_ms: 10_000,
        }
    }
}

/// HTTP client for a TRON full node.
pub struct TronGridClient {
    base_url: String,
    http: reqwest::Client,
}

impl TronGridClient {
    pub fn new(config: TronGridConfig) -> Result<Self, WatcherError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = reqwest::header::HeaderValue::from_str(key)
                .map_err(|e| WatcherError::Source(format!("invalid API key header: {e}")))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| WatcherError::Source(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.full_host.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, WatcherError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WatcherError::Source(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(WatcherError::Source(format!("HTTP {status}: {body}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| WatcherError::Source(e.to_string()))
    }
}

#[async_trait]
impl BlockSource for TronGridClient {
    async fn current_height(&self) -> Result<u64, WatcherError> {
        let v = self.post("/wallet/getnowblock", json!({})).await?;
        head_number(&v).ok_or_else(|| WatcherError::Source("invalid block received from node".into()))
    }

    async fn block(&self, height: u64) -> Result<Block, WatcherError> {
        let v = self
            .post("/wallet/getblockbynum", json!({ "num": height }))
            .await?;
        // The node answers `{}` for heights it does not have yet.
        if v.as_object().map_or(true, |o| o.is_empty()) {
            return Err(WatcherError::BlockUnavailable { height });
        }
        block_from_json(&v)
            .ok_or_else(|| WatcherError::Decode(format!("unrecognized block shape at {height}")))
    }
}

// ─── JSON conversion ──────────────────────────────────────────────────────────

/// Block number from a `getnowblock`-style response.
pub fn head_number(v: &Value) -> Option<u64> {
    v["block_header"]["raw_data"]["number"].as_u64()
}

/// Convert a TronGrid block JSON into a [`Block`].
///
/// Returns `None` only when the header is unusable; malformed transactions
/// are dropped individually.
pub fn block_from_json(v: &Value) -> Option<Block> {
    let header = &v["block_header"]["raw_data"];
    Some(Block {
        height: header["number"].as_u64()?,
        hash: v["blockID"].as_str()?.to_string(),
        timestamp: header["timestamp"].as_i64()?,
        producer: header["witness_address"].as_str().unwrap_or_default().to_string(),
        transactions: v["transactions"]
            .as_array()
            .map(|txs| txs.iter().filter_map(transaction_from_json).collect())
            .unwrap_or_default(),
    })
}

/// Convert a single transaction JSON into a [`Transaction`].
pub fn transaction_from_json(v: &Value) -> Option<Transaction> {
    let raw = &v["raw_data"];
    Some(Transaction {
        hash: v["txID"].as_str()?.to_string(),
        timestamp: raw["timestamp"].as_i64().filter(|ts| *ts > 0),
        operations: raw["contract"]
            .as_array()
            .map(|ops| ops.iter().map(operation_from_json).collect())
            .unwrap_or_default(),
    })
}

/// Convert a contract record into an [`Operation`]; never fails.
pub fn operation_from_json(v: &Value) -> Operation {
    let kind = v["type"].as_str().unwrap_or("Unknown");
    let value = &v["parameter"]["value"];
    let typed = match kind {
        "TransferContract" => transfer_from_json(value),
        "TriggerSmartContract" => trigger_from_json(value),
        _ => None,
    };
    typed.unwrap_or_else(|| Operation::Other {
        kind: kind.to_string(),
    })
}

fn transfer_from_json(value: &Value) -> Option<Operation> {
    Some(Operation::Transfer {
        owner_address: value["owner_address"].as_str()?.to_string(),
        to_address: value["to_address"].as_str()?.to_string(),
        amount: value["amount"].as_i64()?,
    })
}

fn trigger_from_json(value: &Value) -> Option<Operation> {
    Some(Operation::TriggerSmartContract {
        owner_address: value["owner_address"].as_str()?.to_string(),
        contract_address: value["contract_address"].as_str()?.to_string(),
        data: value["data"].as_str().map(str::to_string),
        call_value: value["call_value"].as_i64(),
    })
}
