//! tronostr-nostr — the Nostr side of TRONostr.
//!
//! - [`event_from_insight`]: insight → signed NIP-01 event (via the `nostr` crate)
//! - [`RelayClient`]: WebSocket relay connection with reconnect + resubscribe
//! - [`Publisher`]: signs insights, queues them, drains at a steady rate
//! - [`TronostrClient`]: subscriber side, filtered by kind and tags
//!
//! # Kind mapping
//!
//! | insight type    | kind       |
//! |-----------------|------------|
//! | `TRON_BLOCK`    | `base + 0` |
//! | `TRX_TRANSFER`  | `base + 1` |
//! | `USDT_TRANSFER` | `base + 2` |
//! | anything else   | `base + 9` |

pub mod client;
pub mod error;
pub mod event;
pub mod publisher;
pub mod relay;
pub mod subscriptions;

pub use client::{ReceivedEvent, TronostrClient};
pub use error::{KeyError, RelayError};
pub use event::{event_from_insight, has_tags, kind_for, parse_keys, tag_value, DEFAULT_KIND_BASE};
pub use nostr::{Event, Filter, Keys, Kind, SubscriptionId};
pub use publisher::{Enqueue, Publisher, PublisherConfig, RateLimit};
pub use relay::{Relay, RelayClient, RelayConfig, RelayConnector, WsConnector};
pub use subscriptions::Subscription;
