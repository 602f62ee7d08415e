//! Insight → NIP-01 event mapping and tag helpers.
//!
//! Hashing, signing and verification are done by the `nostr` crate; this
//! module only decides kind, timestamp, tags and content.

use std::borrow::Cow;

use nostr::{Event, EventBuilder, Keys, Kind, Tag, TagKind, Timestamp};

use tronostr_core::insight::{Insight, InsightType};

use crate::error::KeyError;

/// Default first kind of the TRONostr band (`6500..=6599`).
pub const DEFAULT_KIND_BASE: u16 = 6500;

/// Event kind for an insight type: `base + offset` (0, 1, 2, or 9).
pub fn kind_for(insight_type: &InsightType, base: u16) -> u16 {
    base.saturating_add(insight_type.kind_offset())
}

/// Load signing keys from a hex (or `nsec`) secret. A `0x` prefix is accepted.
pub fn parse_keys(secret: &str) -> Result<Keys, KeyError> {
    let secret = secret.trim();
    let secret = secret.strip_prefix("0x").unwrap_or(secret);
    Keys::parse(secret).map_err(|e| KeyError::InvalidSecretKey(e.to_string()))
}

/// Build and sign the outbound event for an insight.
///
/// `created_at` is the insight timestamp in whole seconds, tags are copied in
/// order and `content` is the JSON text of the insight content.
pub fn event_from_insight(insight: &Insight, kind_base: u16, keys: &Keys) -> Result<Event, KeyError> {
    let tags = insight.tags.iter().map(|t| {
        Tag::custom(
            TagKind::Custom(Cow::Owned(t.key().to_string())),
            [t.value().to_string()],
        )
    });
    let created_at = u64::try_from(insight.created_at()).unwrap_or_default();

    EventBuilder::new(
        Kind::from(kind_for(&insight.insight_type, kind_base)),
        insight.content.to_string(),
    )
    .tags(tags)
    .custom_created_at(Timestamp::from(created_at))
    .sign_with_keys(keys)
    .map_err(|e| KeyError::Signing(e.to_string()))
}

/// First value of the first tag named `key`.
pub fn tag_value<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event
        .tags
        .iter()
        .map(Tag::as_slice)
        .find(|t| t.first().map(String::as_str) == Some(key))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}

/// `true` when every `(name, value)` pair is present as a tag.
pub fn has_tags(event: &Event, required: &[(&str, &str)]) -> bool {
    required
        .iter()
        .all(|(name, value)| tag_value(event, name) == Some(*value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tronostr_core::insight::Severity;

    // BIP-340 test vector 0
    const SECRET: &str = "0000000000000000000000000000000000000000000000000000000000000003";
    const PUBKEY: &str = "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";

    fn transfer_insight() -> Insight {
        Insight::new(
            InsightType::TrxTransfer,
            1_717_000_000_999,
            Severity::Medium,
            json!({ "amount": 2500.0 }),
        )
        .tag("chain", "tron")
        .tag("type", "whale_transfer")
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(kind_for(&InsightType::TronBlock, 6500), 6500);
        assert_eq!(kind_for(&InsightType::TrxTransfer, 6500), 6501);
        assert_eq!(kind_for(&InsightType::UsdtTransfer, 6500), 6502);
        assert_eq!(kind_for(&InsightType::from("NEW_TOKEN"), 6500), 6509);
        assert_eq!(kind_for(&InsightType::TronBlock, 30000), 30000);
        assert_eq!(kind_for(&InsightType::from("NEW_TOKEN"), u16::MAX), u16::MAX);
    }

    #[test]
    fn keys_from_secret() {
        let keys = parse_keys(SECRET).unwrap();
        assert_eq!(keys.public_key().to_hex(), PUBKEY);
        let prefixed = parse_keys(&format!("0x{SECRET}")).unwrap();
        assert_eq!(prefixed.public_key(), keys.public_key());
    }

    #[test]
    fn rejects_bad_secret() {
        assert!(matches!(parse_keys("zz"), Err(KeyError::InvalidSecretKey(_))));
        assert!(parse_keys(&"00".repeat(32)).is_err());
    }

    #[test]
    fn insight_event_fields() {
        let keys = parse_keys(SECRET).unwrap();
        let event = event_from_insight(&transfer_insight(), DEFAULT_KIND_BASE, &keys).unwrap();

        assert_eq!(event.kind.as_u16(), 6501);
        assert_eq!(event.created_at.as_u64(), 1_717_000_000);
        assert_eq!(event.pubkey.to_hex(), PUBKEY);
        assert_eq!(event.content, r#"{"amount":2500.0}"#);
        let tags: Vec<Vec<String>> = event.tags.iter().map(|t| t.as_slice().to_vec()).collect();
        assert_eq!(
            tags,
            vec![
                vec!["chain".to_string(), "tron".to_string()],
                vec!["type".to_string(), "whale_transfer".to_string()],
            ]
        );
        assert_eq!(tag_value(&event, "type"), Some("whale_transfer"));
        assert_eq!(tag_value(&event, "severity"), None);
        assert!(has_tags(&event, &[("chain", "tron"), ("type", "whale_transfer")]));
        assert!(!has_tags(&event, &[("type", "block_metrics")]));
    }

    #[test]
    fn id_matches_known_hash() {
        let keys = parse_keys(SECRET).unwrap();
        let event = event_from_insight(&transfer_insight(), DEFAULT_KIND_BASE, &keys).unwrap();
        assert_eq!(
            event.id.to_hex(),
            "6f22e5f63fa475c68b94650f835fd0fa5bc1c7c7cadb9a3cb32ae96de8da8a00"
        );
        assert!(event.verify().is_ok());
    }

    #[test]
    fn tampered_content_fails_verification() {
        let event = event_from_insight(&transfer_insight(), DEFAULT_KIND_BASE, &Keys::generate()).unwrap();
        let mut v = serde_json::to_value(&event).unwrap();
        v["content"] = json!(r#"{"amount":1.0}"#);
        // the id no longer matches, either at parse time or on verify
        let tampered: Result<Event, _> = serde_json::from_value(v);
        assert!(tampered.map_or(true, |e| e.verify().is_err()));
    }

    #[test]
    fn negative_timestamp_clamps_to_zero() {
        let insight = Insight::new(InsightType::TronBlock, -5_000, Severity::Info, json!({}));
        let event = event_from_insight(&insight, DEFAULT_KIND_BASE, &Keys::generate()).unwrap();
        assert_eq!(event.created_at.as_u64(), 0);
    }
}
