//! NIP-01 relay client over WebSocket with auto-reconnect.
//!
//! A background task owns the socket. Callers talk to it through a command
//! channel; `publish` waits for the relay's `OK` on a oneshot. After a
//! disconnect the task reconnects with exponential backoff and re-sends every
//! live `REQ`. Acks in flight at the time of the disconnect fail with
//! [`RelayError::Disconnected`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use nostr::{ClientMessage, Event, EventId, Filter, JsonUtil, RelayMessage, SubscriptionId};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::RelayError;
use crate::subscriptions::{Subscription, SubscriptionManager};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type PendingAcks = HashMap<EventId, oneshot::Sender<Result<(), RelayError>>>;

// ─── Seams ────────────────────────────────────────────────────────────────────

/// Anything the publisher can push events to.
#[async_trait]
pub trait Relay: Send + Sync {
    fn url(&self) -> &str;

    /// Send an event and wait for the relay's verdict.
    async fn publish(&self, event: &Event) -> Result<(), RelayError>;
}

/// Opens [`Relay`] connections by URL.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Relay>, RelayError>;
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`RelayClient`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long `publish` waits for `OK`.
    pub ack_timeout: Duration,
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(10),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// Command sent from callers to the background task.
enum RelayCommand {
    Publish {
        event: Event,
        ack: oneshot::Sender<Result<(), RelayError>>,
    },
    Subscribe {
        id: SubscriptionId,
        filter: Filter,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Close,
}

// ─── RelayClient ──────────────────────────────────────────────────────────────

/// A connection to one Nostr relay.
pub struct RelayClient {
    url: String,
    config: RelayConfig,
    cmd_tx: mpsc::UnboundedSender<RelayCommand>,
    subscriptions: SubscriptionManager,
    next_sub: AtomicU64,
}

impl RelayClient {
    /// Perform the WebSocket handshake and start the background task.
    ///
    /// Only the initial handshake can fail; later disconnects are retried
    /// in the background.
    pub async fn connect(url: impl Into<String>, config: RelayConfig) -> Result<Self, RelayError> {
        let url = url.into();
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| RelayError::Connection {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(url = %url, "Connected to relay");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new();
        tokio::spawn(relay_task(
            url.clone(),
            ws,
            cmd_rx,
            subscriptions.clone(),
            config.clone(),
        ));

        Ok(Self {
            url,
            config,
            cmd_tx,
            subscriptions,
            next_sub: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `["EVENT", event]` and wait up to `ack_timeout` for `OK`.
    pub async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(RelayCommand::Publish {
                event: event.clone(),
                ack,
            })
            .map_err(|_| RelayError::Disconnected)?;

        match time::timeout(self.config.ack_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RelayError::Disconnected),
            Err(_) => Err(RelayError::Timeout {
                ms: self.config.ack_timeout.as_millis() as u64,
            }),
        }
    }

    /// Open a subscription. Events arrive on the returned receiver until
    /// [`unsubscribe`](Self::unsubscribe) or until the receiver is dropped.
    pub fn subscribe(&self, filter: Filter) -> Result<Subscription, RelayError> {
        let id = SubscriptionId::new(format!(
            "tronostr-{}",
            self.next_sub.fetch_add(1, Ordering::Relaxed)
        ));
        let receiver = self.subscriptions.register(id.clone(), filter.clone());
        if self
            .cmd_tx
            .send(RelayCommand::Subscribe {
                id: id.clone(),
                filter,
            })
            .is_err()
        {
            self.subscriptions.remove(&id);
            return Err(RelayError::Disconnected);
        }
        Ok(Subscription { id, receiver })
    }

    /// Send `["CLOSE", id]` and stop routing events for it.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.subscriptions.remove(id);
        let _ = self.cmd_tx.send(RelayCommand::Unsubscribe { id: id.clone() });
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Stop the background task and close the socket.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(RelayCommand::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(RelayCommand::Close);
    }
}

#[async_trait]
impl Relay for RelayClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        RelayClient::publish(self, event).await
    }
}

/// Opens real WebSocket [`RelayClient`]s.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: RelayConfig,
}

impl WsConnector {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Relay>, RelayError> {
        let client = RelayClient::connect(url, self.config.clone()).await?;
        Ok(Arc::new(client))
    }
}

// ─── Background task ──────────────────────────────────────────────────────────

enum SessionEnd {
    Closed,
    Disconnected,
}

async fn relay_task(
    url: String,
    mut ws: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<RelayCommand>,
    subscriptions: SubscriptionManager,
    config: RelayConfig,
) {
    let mut backoff = config.reconnect_initial;

    loop {
        if let SessionEnd::Closed = run_session(&url, ws, &mut cmd_rx, &subscriptions).await {
            tracing::debug!(url = %url, "relay client closed");
            return;
        }

        ws = loop {
            tracing::warn!(url = %url, "Relay disconnected, reconnecting in {backoff:?}");
            if !wait_backoff(backoff, &mut cmd_rx).await {
                return;
            }
            backoff = (backoff * 2).min(config.reconnect_max);

            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    backoff = config.reconnect_initial;
                    break ws;
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "Relay reconnect failed"),
            }
        };
        tracing::info!(url = %url, subscriptions = subscriptions.len(), "Reconnected to relay");
    }
}

/// Drive one connected socket until it drops or the client closes.
async fn run_session(
    url: &str,
    ws: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<RelayCommand>,
    subscriptions: &SubscriptionManager,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    let mut pending = PendingAcks::new();

    // Re-send active subscriptions (a no-op on the first session)
    for (id, filter) in subscriptions.active_subscriptions() {
        if let Err(e) = send(&mut sink, ClientMessage::req(id, vec![filter])).await {
            tracing::warn!(url, error = %e, "failed to resubscribe");
            return SessionEnd::Disconnected;
        }
    }

    let end = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None | Some(RelayCommand::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break SessionEnd::Closed;
                }
                Some(RelayCommand::Publish { event, ack }) => {
                    pending.retain(|_, ack| !ack.is_closed());
                    pending.insert(event.id, ack);
                    if let Err(e) = send(&mut sink, ClientMessage::event(event)).await {
                        tracing::warn!(url, error = %e, "relay send failed");
                        break SessionEnd::Disconnected;
                    }
                }
                Some(RelayCommand::Subscribe { id, filter }) => {
                    if send(&mut sink, ClientMessage::req(id, vec![filter])).await.is_err() {
                        break SessionEnd::Disconnected;
                    }
                }
                Some(RelayCommand::Unsubscribe { id }) => {
                    if send(&mut sink, ClientMessage::close(id)).await.is_err() {
                        break SessionEnd::Disconnected;
                    }
                }
            },
            msg = stream.next() => match msg {
                None => break SessionEnd::Disconnected,
                Some(Err(e)) => {
                    tracing::warn!(url, error = %e, "relay receive error");
                    break SessionEnd::Disconnected;
                }
                Some(Ok(Message::Text(text))) => {
                    handle_frame(url, &text, &mut pending, subscriptions);
                }
                Some(Ok(Message::Close(_))) => break SessionEnd::Disconnected,
                Some(Ok(_)) => {}
            },
        }
    };

    for (_, ack) in pending.drain() {
        let _ = ack.send(Err(RelayError::Disconnected));
    }
    end
}

/// Sleep out a reconnect delay while still answering callers.
///
/// Returns `false` when the client was closed in the meantime.
async fn wait_backoff(delay: Duration, cmd_rx: &mut mpsc::UnboundedReceiver<RelayCommand>) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                None | Some(RelayCommand::Close) => return false,
                Some(RelayCommand::Publish { ack, .. }) => {
                    let _ = ack.send(Err(RelayError::Disconnected));
                }
                // REQs are replayed from the subscription manager on reconnect
                Some(RelayCommand::Subscribe { .. }) | Some(RelayCommand::Unsubscribe { .. }) => {}
            },
        }
    }
}

async fn send(sink: &mut WsSink, msg: ClientMessage) -> Result<(), RelayError> {
    sink.send(Message::Text(msg.as_json()))
        .await
        .map_err(|e| RelayError::WebSocket(e.to_string()))
}

fn handle_frame(url: &str, text: &str, pending: &mut PendingAcks, subscriptions: &SubscriptionManager) {
    let msg = match RelayMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            let e = RelayError::Protocol(e.to_string());
            tracing::debug!(url, error = %e, "ignoring relay frame");
            return;
        }
    };

    match msg {
        RelayMessage::Ok {
            event_id,
            status,
            message,
        } => {
            if let Some(ack) = pending.remove(&event_id) {
                let result = if status {
                    Ok(())
                } else {
                    Err(RelayError::Rejected {
                        event_id: event_id.to_hex(),
                        message,
                    })
                };
                let _ = ack.send(result);
            }
        }
        RelayMessage::Event {
            subscription_id,
            event,
        } => {
            if !subscriptions.dispatch(&subscription_id, *event) {
                tracing::debug!(url, subscription = %subscription_id, "event for inactive subscription");
            }
        }
        RelayMessage::EndOfStoredEvents(subscription_id) => {
            tracing::debug!(url, subscription = %subscription_id, "end of stored events");
        }
        RelayMessage::Closed {
            subscription_id,
            message,
        } => {
            tracing::warn!(url, subscription = %subscription_id, message = %message, "relay closed subscription");
            subscriptions.remove(&subscription_id);
        }
        other => {
            tracing::debug!(url, message = ?other, "relay message");
        }
    }
}
