//! `config.yaml` loading and validation.
//!
//! Keys are snake_case; the camelCase spellings (`fullHost`, `kindRange`,
//! `rateLimit`, `whaleTransfer`, …) are accepted as aliases. Every section
//! and field has a default, so an empty file is a valid config.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use tronostr_core::detector::DetectorRegistry;
use tronostr_core::error::DetectorError;
use tronostr_core::watcher::WatcherConfig;
use tronostr_nostr::{PublisherConfig, RateLimit, DEFAULT_KIND_BASE};
use tronostr_tron::{
    BlockMetricsDetector, TronGridConfig, WhaleTransferConfig, WhaleTransferDetector,
};

use crate::logging::LogConfig;

/// Width of the kind band in use: offsets `0..=9`.
const KIND_BAND: u16 = 9;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tron: TronSection,
    pub nostr: NostrSection,
    pub detectors: DetectorsSection,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TronSection {
    /// Full-node base URL.
    #[serde(alias = "fullHost")]
    pub full_host: String,
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(alias = "requestTimeoutMs")]
    pub request_timeout_ms: u64,
}

impl Default for TronSection {
    fn default() -> Self {
        let grid = TronGridConfig::default();
        Self {
            full_host: grid.full_host,
            poll_interval_ms: WatcherConfig::default().poll_interval_ms,
            request_timeout_ms: grid.request_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NostrSection {
    pub relays: Vec<String>,
    #[serde(alias = "kindRange")]
    pub kind_range: KindRange,
    #[serde(alias = "rateLimit")]
    pub rate_limit: RateLimit,
}

impl Default for NostrSection {
    fn default() -> Self {
        Self {
            relays: vec!["wss://nos.lol".into(), "wss://relay.damus.io".into()],
            kind_range: KindRange::default(),
            rate_limit: RateLimit::default(),
        }
    }
}

/// Reserved kind band; only `start` is used for the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindRange {
    pub start: u16,
    pub end: u16,
}

impl Default for KindRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_KIND_BASE,
            end: DEFAULT_KIND_BASE + 99,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorsSection {
    #[serde(alias = "blockMetrics")]
    pub block_metrics: Toggle,
    #[serde(alias = "whaleTransfer")]
    pub whale_transfer: WhaleTransferSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toggle {
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for Toggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleTransferSection {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: WhaleTransferConfig,
}

impl Default for WhaleTransferSection {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: WhaleTransferConfig::default(),
        }
    }
}

fn bool_true() -> bool {
    true
}

impl AppConfig {
    /// Read and parse a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // an empty document parses as null
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        let rate = &self.nostr.rate_limit;
        ensure!(rate.events_per_minute > 0, "nostr.rate_limit.events_per_minute must be > 0");
        ensure!(rate.queue_size > 0, "nostr.rate_limit.queue_size must be > 0");

        let range = self.nostr.kind_range;
        ensure!(
            u32::from(range.start) + u32::from(KIND_BAND) <= u32::from(range.end),
            "nostr.kind_range must span at least {} kinds (got {}..={})",
            KIND_BAND + 1,
            range.start,
            range.end
        );
        ensure!(!self.nostr.relays.is_empty(), "nostr.relays must list at least one relay");
        ensure!(self.tron.poll_interval_ms > 0, "tron.poll_interval_ms must be > 0");
        Ok(())
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval_ms: self.tron.poll_interval_ms,
        }
    }

    pub fn tron_grid_config(&self, api_key: Option<String>) -> TronGridConfig {
        TronGridConfig {
            full_host: self.tron.full_host.clone(),
            api_key,
            request_timeout_ms: self.tron.request_timeout_ms,
        }
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            relays: self.nostr.relays.clone(),
            kind_base: self.nostr.kind_range.start,
            rate_limit: self.nostr.rate_limit,
            idle_interval: Duration::from_millis(1000),
            ..Default::default()
        }
    }

    /// Enabled detectors, whale transfers first.
    pub fn detector_registry(&self) -> Result<DetectorRegistry, DetectorError> {
        let mut registry = DetectorRegistry::new();
        let whale = &self.detectors.whale_transfer;
        if whale.enabled {
            registry.register(Arc::new(WhaleTransferDetector::new(whale.settings.clone())?));
        }
        if self.detectors.block_metrics.enabled {
            registry.register(Arc::new(BlockMetricsDetector::new()));
        }
        Ok(registry)
    }
}
