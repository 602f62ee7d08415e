//! Relay and key error types.

use thiserror::Error;

/// Errors from talking to a Nostr relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The WebSocket handshake failed.
    #[error("Failed to connect to relay {url}: {reason}")]
    Connection { url: String, reason: String },

    /// Send/receive failure on an established socket.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The relay answered `OK` with `accepted = false`.
    #[error("Relay rejected event {event_id}: {message}")]
    Rejected { event_id: String, message: String },

    /// No `OK` arrived within the ack timeout.
    #[error("Relay did not acknowledge within {ms}ms")]
    Timeout { ms: u64 },

    /// The connection dropped while the request was in flight, or the
    /// client has been closed.
    #[error("Relay connection closed")]
    Disconnected,

    /// A relay frame could not be parsed.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RelayError {
    /// Returns `true` if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::WebSocket(_) | Self::Timeout { .. } | Self::Disconnected
        )
    }
}

/// Errors from loading keys or signing.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid secp256k1 secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}
