//! Subscriber-side client for TRONostr events.
//!
//! Opens the same subscription on every connected relay and merges the
//! results into one channel. Events are forwarded as they arrive; the same
//! event seen on two relays is delivered twice.
//!
//! Relays only index single-letter tags, so the `REQ` filters select by kind
//! and the `chain` / `type` tags are checked here on receipt.

use nostr::{Event, Filter, Kind};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::event::{has_tags, tag_value, DEFAULT_KIND_BASE};
use crate::relay::{RelayClient, RelayConfig};

/// Tags every TRONostr event carries.
pub const CHAIN_TAGS: &[(&str, &str)] = &[("chain", "tron")];
pub const BLOCK_TAGS: &[(&str, &str)] = &[("chain", "tron"), ("type", "block_metrics")];
pub const TRANSFER_TAGS: &[(&str, &str)] = &[("chain", "tron"), ("type", "whale_transfer")];

/// An event as handed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    /// Relay the event arrived from.
    pub relay: String,
    pub event: Event,
    /// `content` parsed as JSON, `None` when it is not JSON.
    pub parsed_content: Option<Value>,
}

impl ReceivedEvent {
    pub fn new(relay: impl Into<String>, event: Event) -> Self {
        let parsed_content = serde_json::from_str(&event.content).ok();
        Self {
            relay: relay.into(),
            event,
            parsed_content,
        }
    }

    /// First value of the tag named `key`.
    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.event, key)
    }

    /// Severity from the `severity` tag, falling back to the content field.
    pub fn severity(&self) -> Option<&str> {
        self.tag("severity").or_else(|| {
            self.parsed_content
                .as_ref()
                .and_then(|c| c.get("severity"))
                .and_then(Value::as_str)
        })
    }

    /// `true` for `high` and `critical` events.
    pub fn is_alert(&self) -> bool {
        matches!(self.severity(), Some("high" | "critical"))
    }
}

/// Subscribes to TRONostr events across a relay set.
pub struct TronostrClient {
    urls: Vec<String>,
    kind_base: u16,
    config: RelayConfig,
    relays: Vec<RelayClient>,
}

impl TronostrClient {
    pub fn new(urls: Vec<String>, kind_base: u16) -> Self {
        Self::with_config(urls, kind_base, RelayConfig::default())
    }

    pub fn with_config(urls: Vec<String>, kind_base: u16, config: RelayConfig) -> Self {
        Self {
            urls,
            kind_base,
            config,
            relays: Vec::new(),
        }
    }

    /// Connect every relay; failures are logged and skipped. Returns the
    /// number of connected relays.
    ///
    /// Relays that are already connected are left alone, so calling this
    /// again only retries the ones that failed.
    pub async fn connect(&mut self) -> usize {
        for url in &self.urls {
            if self.relays.iter().any(|r| r.url() == url) {
                continue;
            }
            match RelayClient::connect(url.as_str(), self.config.clone()).await {
                Ok(relay) => self.relays.push(relay),
                Err(e) => tracing::warn!(url = %url, error = %e, "Failed to connect to relay"),
            }
        }
        self.relays.len()
    }

    pub fn connected(&self) -> usize {
        self.relays.len()
    }

    // ─── Filters ──────────────────────────────────────────────────────────────

    fn kinds(&self, offsets: &[u16]) -> Filter {
        Filter::new().kinds(
            offsets
                .iter()
                .map(|offset| Kind::from(self.kind_base.saturating_add(*offset))),
        )
    }

    /// Every TRONostr kind: `base`, `base + 1`, `base + 2`, `base + 9`.
    pub fn all_filter(&self) -> Filter {
        self.kinds(&[0, 1, 2, 9])
    }

    pub fn block_filter(&self) -> Filter {
        self.kinds(&[0])
    }

    pub fn transfer_filter(&self) -> Filter {
        self.kinds(&[1, 2])
    }

    // ─── Subscriptions ────────────────────────────────────────────────────────

    pub fn on_all(&self) -> mpsc::UnboundedReceiver<ReceivedEvent> {
        self.subscribe(self.all_filter(), CHAIN_TAGS, |_| true)
    }

    /// Block metrics (`base`).
    pub fn on_block(&self) -> mpsc::UnboundedReceiver<ReceivedEvent> {
        self.subscribe(self.block_filter(), BLOCK_TAGS, |_| true)
    }

    /// TRX and USDT whale transfers (`base + 1`, `base + 2`).
    pub fn on_transfer(&self) -> mpsc::UnboundedReceiver<ReceivedEvent> {
        self.subscribe(self.transfer_filter(), TRANSFER_TAGS, |_| true)
    }

    /// Everything from [`on_all`](Self::on_all) rated `high` or `critical`.
    pub fn on_alerts(&self) -> mpsc::UnboundedReceiver<ReceivedEvent> {
        self.subscribe(self.all_filter(), CHAIN_TAGS, ReceivedEvent::is_alert)
    }

    /// Subscribe on every relay with `filter`, forwarding events that carry
    /// every tag in `tags` and pass `keep`. Events with a bad id or
    /// signature are discarded.
    pub fn subscribe(
        &self,
        filter: Filter,
        tags: &'static [(&'static str, &'static str)],
        keep: fn(&ReceivedEvent) -> bool,
    ) -> mpsc::UnboundedReceiver<ReceivedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        for relay in &self.relays {
            let mut sub = match relay.subscribe(filter.clone()) {
                Ok(sub) => sub,
                Err(e) => {
                    tracing::warn!(url = relay.url(), error = %e, "Failed to subscribe");
                    continue;
                }
            };
            let url = relay.url().to_string();
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = sub.receiver.recv().await {
                    if let Err(e) = event.verify() {
                        tracing::debug!(url = %url, id = %event.id, error = %e, "dropping event with invalid signature");
                        continue;
                    }
                    if !has_tags(&event, tags) {
                        continue;
                    }
                    let received = ReceivedEvent::new(url.as_str(), event);
                    if keep(&received) && tx.send(received).is_err() {
                        break;
                    }
                }
            });
        }
        rx
    }

    /// Close every relay connection.
    pub fn close(&self) {
        for relay in &self.relays {
            relay.close();
        }
    }
}

impl Default for TronostrClient {
    fn default() -> Self {
        Self::new(Vec::new(), DEFAULT_KIND_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventBuilder, Keys, Tag, TagKind};
    use serde_json::json;
    use std::borrow::Cow;

    fn received(tags: &[(&str, &str)], content: &str) -> ReceivedEvent {
        let tags = tags
            .iter()
            .map(|(k, v)| Tag::custom(TagKind::Custom(Cow::Owned(k.to_string())), [v.to_string()]));
        let event = EventBuilder::new(Kind::from(6501), content)
            .tags(tags)
            .sign_with_keys(&Keys::generate())
            .unwrap();
        ReceivedEvent::new("ws://t", event)
    }

    fn kinds(filter: &Filter) -> Vec<u64> {
        let v = serde_json::to_value(filter).unwrap();
        let mut kinds: Vec<u64> = v["kinds"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_u64)
            .collect();
        kinds.sort_unstable();
        kinds
    }

    #[test]
    fn filters_for_default_band() {
        let client = TronostrClient::default();
        assert_eq!(kinds(&client.all_filter()), vec![6500, 6501, 6502, 6509]);
        assert_eq!(kinds(&client.block_filter()), vec![6500]);
        assert_eq!(kinds(&client.transfer_filter()), vec![6501, 6502]);
    }

    #[test]
    fn custom_band() {
        let client = TronostrClient::new(vec![], 30000);
        assert_eq!(kinds(&client.all_filter()), vec![30000, 30001, 30002, 30009]);
    }

    #[test]
    fn band_near_u16_max_saturates() {
        let client = TronostrClient::new(vec![], 65530);
        assert_eq!(kinds(&client.all_filter()), vec![65530, 65531, 65532, 65535]);
        assert_eq!(kinds(&client.transfer_filter()), vec![65531, 65532]);
        assert_eq!(kinds(&TronostrClient::new(vec![], u16::MAX).all_filter()), vec![65535]);
    }

    #[test]
    fn parsed_content() {
        assert_eq!(
            received(&[], r#"{"amount":5}"#).parsed_content,
            Some(json!({ "amount": 5 }))
        );
        assert_eq!(received(&[], "plain text").parsed_content, None);
    }

    #[test]
    fn alert_classification() {
        assert!(received(&[("severity", "high")], "{}").is_alert());
        assert!(received(&[("severity", "critical")], "{}").is_alert());
        assert!(!received(&[("severity", "medium")], "{}").is_alert());
        // content fallback
        assert!(received(&[], r#"{"severity":"critical"}"#).is_alert());
        assert!(!received(&[], "not json").is_alert());
    }

    #[test]
    fn stream_tags() {
        let transfer = received(&[("chain", "tron"), ("type", "whale_transfer")], "{}");
        assert!(has_tags(&transfer.event, TRANSFER_TAGS));
        assert!(has_tags(&transfer.event, CHAIN_TAGS));
        assert!(!has_tags(&transfer.event, BLOCK_TAGS));
        assert_eq!(transfer.tag("type"), Some("whale_transfer"));
    }
}
