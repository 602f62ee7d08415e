//! Insights — typed, severity-tagged facts derived by detectors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Severity ─────────────────────────────────────────────────────────────────

/// Ordered severity scale: `Info < Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Threshold policy shared by the transfer detectors.
    ///
    /// Returns `None` below `threshold`, `High` at or above
    /// `threshold * high_multiplier`, and `Medium` in between.
    pub fn for_magnitude(magnitude: f64, threshold: f64, high_multiplier: f64) -> Option<Self> {
        if magnitude < threshold {
            None
        } else if magnitude >= threshold * high_multiplier {
            Some(Self::High)
        } else {
            Some(Self::Medium)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── InsightType ──────────────────────────────────────────────────────────────

/// The insight's type tag. Serialized as its wire string (`"TRON_BLOCK"`, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InsightType {
    /// Per-block statistics.
    TronBlock,
    /// Large native TRX transfer.
    TrxTransfer,
    /// Large USDT (TRC-20) transfer.
    UsdtTransfer,
    /// Any type this build has no dedicated kind for.
    Other(String),
}

impl InsightType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TronBlock => "TRON_BLOCK",
            Self::TrxTransfer => "TRX_TRANSFER",
            Self::UsdtTransfer => "USDT_TRANSFER",
            Self::Other(s) => s,
        }
    }

    /// Offset of this type within the published kind range.
    ///
    /// Subscribers rely on these exact values; unknown types share slot 9.
    pub fn kind_offset(&self) -> u16 {
        match self {
            Self::TronBlock => 0,
            Self::TrxTransfer => 1,
            Self::UsdtTransfer => 2,
            Self::Other(_) => 9,
        }
    }
}

impl From<String> for InsightType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "TRON_BLOCK" => Self::TronBlock,
            "TRX_TRANSFER" => Self::TrxTransfer,
            "USDT_TRANSFER" => Self::UsdtTransfer,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for InsightType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<InsightType> for String {
    fn from(t: InsightType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Tag ──────────────────────────────────────────────────────────────────────

/// A `[key, value]` pair used for relay-side filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag(pub String, pub String);

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self(key.into(), value.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> &str {
        &self.1
    }
}

// ─── Insight ──────────────────────────────────────────────────────────────────

/// A derived fact, produced by a detector and consumed once by a publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub severity: Severity,
    /// Detector-defined payload.
    pub content: Value,
    /// Filtering tags; always carries `chain` and `type`.
    pub tags: Vec<Tag>,
}

impl Insight {
    pub fn new(
        insight_type: impl Into<InsightType>,
        timestamp: i64,
        severity: Severity,
        content: Value,
    ) -> Self {
        Self {
            insight_type: insight_type.into(),
            timestamp,
            severity,
            content,
            tags: Vec::new(),
        }
    }

    /// Append a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// First value for `key`, if any.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.key() == key).map(Tag::value)
    }

    /// Timestamp in whole seconds, rounded down.
    pub fn created_at(&self) -> i64 {
        self.timestamp.div_euclid(1000)
    }
}
