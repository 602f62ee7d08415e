//! Relay client and subscriber client against an in-process NIP-01 relay.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use tronostr_core::insight::{Insight, InsightType, Severity};
use tronostr_nostr::{
    event_from_insight, Event, Filter, Keys, Kind, RelayClient, RelayConfig, RelayError,
    TronostrClient, DEFAULT_KIND_BASE,
};

// ─── Test relay ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct RelayState {
    events: Vec<Event>,
    /// (subscription id, filter, outbound channel of the owning connection)
    subs: Vec<(String, Filter, mpsc::UnboundedSender<String>)>,
    /// Every REQ subscription id received, across connections.
    reqs: Vec<String>,
    connections: usize,
}

type Shared = Arc<Mutex<RelayState>>;

/// Accepts any number of connections. Events whose content contains
/// `"reject"` are refused. With `drop_first`, the first connection is cut as
/// soon as it has sent one REQ.
async fn spawn_relay(drop_first: bool) -> (String, Shared) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let state: Shared = Arc::default();

    let shared = Arc::clone(&state);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let first = {
                    let mut s = shared.lock().unwrap();
                    s.connections += 1;
                    s.connections == 1
                };
                serve(ws, shared, drop_first && first).await;
            });
        }
    });
    (url, state)
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    shared: Shared,
    drop_after_req: bool,
) {
    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        let frame: Vec<Value> = serde_json::from_str(&text).unwrap();
        match frame[0].as_str().unwrap() {
            "EVENT" => {
                let event: Event = serde_json::from_value(frame[1].clone()).unwrap();
                let accepted = !event.content.contains("reject");
                let reply = json!(["OK", event.id.to_hex(), accepted, if accepted { "" } else { "blocked: test" }]);
                out_tx.send(reply.to_string()).unwrap();
                if accepted {
                    let mut s = shared.lock().unwrap();
                    for (sub_id, filter, tx) in &s.subs {
                        if filter.match_event(&event) {
                            let _ = tx.send(json!(["EVENT", sub_id, event]).to_string());
                        }
                    }
                    s.events.push(event);
                }
            }
            "REQ" => {
                let sub_id = frame[1].as_str().unwrap().to_string();
                let filter: Filter = serde_json::from_value(frame[2].clone()).unwrap();
                {
                    let mut s = shared.lock().unwrap();
                    for event in s.events.iter().filter(|e| filter.match_event(e)) {
                        out_tx.send(json!(["EVENT", sub_id, event]).to_string()).unwrap();
                    }
                    out_tx.send(json!(["EOSE", sub_id]).to_string()).unwrap();
                    s.reqs.push(sub_id.clone());
                    s.subs.push((sub_id, filter, out_tx.clone()));
                }
                if drop_after_req {
                    break;
                }
            }
            "CLOSE" => {
                let sub_id = frame[1].as_str().unwrap();
                shared.lock().unwrap().subs.retain(|(id, _, _)| id != sub_id);
            }
            _ => {}
        }
    }
    writer.abort();
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn fast_config() -> RelayConfig {
    RelayConfig {
        ack_timeout: Duration::from_secs(5),
        reconnect_initial: Duration::from_millis(50),
        reconnect_max: Duration::from_millis(200),
    }
}

fn signed(keys: &Keys, insight_type: InsightType, severity: Severity, content: Value, kind_tag: &str) -> Event {
    signed_on(keys, "tron", insight_type, severity, content, kind_tag)
}

fn signed_on(
    keys: &Keys,
    chain: &str,
    insight_type: InsightType,
    severity: Severity,
    content: Value,
    kind_tag: &str,
) -> Event {
    let insight = Insight::new(insight_type, 1_717_000_000_000, severity, content)
        .tag("chain", chain)
        .tag("type", kind_tag)
        .tag("severity", severity.as_str());
    event_from_insight(&insight, DEFAULT_KIND_BASE, keys).unwrap()
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn publish_is_acknowledged() {
    let (url, state) = spawn_relay(false).await;
    let client = RelayClient::connect(url.as_str(), fast_config()).await.unwrap();
    let keys = Keys::generate();

    let event = signed(&keys, InsightType::TronBlock, Severity::Info, json!({"height": 1}), "block_metrics");
    client.publish(&event).await.unwrap();

    assert_eq!(state.lock().unwrap().events, vec![event]);
}

#[tokio::test]
async fn rejected_publish_surfaces_relay_message() {
    let (url, _state) = spawn_relay(false).await;
    let client = RelayClient::connect(url.as_str(), fast_config()).await.unwrap();

    let event = signed(&Keys::generate(), InsightType::TronBlock, Severity::Info, json!("reject me"), "block_metrics");
    let err = client.publish(&event).await.unwrap_err();
    match err {
        RelayError::Rejected { event_id, message } => {
            assert_eq!(event_id, event.id.to_hex());
            assert_eq!(message, "blocked: test");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn subscription_receives_stored_and_live_events() {
    let (url, _state) = spawn_relay(false).await;
    let publisher = RelayClient::connect(url.as_str(), fast_config()).await.unwrap();
    let subscriber = RelayClient::connect(url.as_str(), fast_config()).await.unwrap();
    let keys = Keys::generate();

    let stored = signed(&keys, InsightType::TrxTransfer, Severity::Medium, json!({"amount": 1}), "whale_transfer");
    publisher.publish(&stored).await.unwrap();

    let mut sub = subscriber
        .subscribe(Filter::new().kind(Kind::from(DEFAULT_KIND_BASE + 1)))
        .unwrap();
    assert_eq!(recv(&mut sub.receiver).await, stored);

    // not matched by the filter
    let block = signed(&keys, InsightType::TronBlock, Severity::Info, json!({}), "block_metrics");
    publisher.publish(&block).await.unwrap();
    let live = signed(&keys, InsightType::TrxTransfer, Severity::High, json!({"amount": 2}), "whale_transfer");
    publisher.publish(&live).await.unwrap();

    assert_eq!(recv(&mut sub.receiver).await, live);
    assert_eq!(subscriber.subscription_count(), 1);

    subscriber.unsubscribe(&sub.id);
    assert_eq!(subscriber.subscription_count(), 0);
}

#[tokio::test]
async fn resubscribes_after_disconnect() {
    let (url, state) = spawn_relay(true).await;
    let client = RelayClient::connect(url.as_str(), fast_config()).await.unwrap();

    let mut sub = client.subscribe(Filter::new().kind(Kind::from(DEFAULT_KIND_BASE))).unwrap();

    // wait for the second connection to replay the REQ
    for _ in 0..100 {
        if state.lock().unwrap().reqs.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    {
        let s = state.lock().unwrap();
        assert_eq!(s.connections, 2);
        assert_eq!(s.reqs, vec![sub.id.to_string(), sub.id.to_string()]);
    }

    let event = signed(&Keys::generate(), InsightType::TronBlock, Severity::Info, json!({}), "block_metrics");
    client.publish(&event).await.unwrap();
    assert_eq!(recv(&mut sub.receiver).await, event);
}

#[tokio::test]
async fn closed_client_reports_disconnected() {
    let (url, _state) = spawn_relay(false).await;
    let client = RelayClient::connect(url.as_str(), fast_config()).await.unwrap();
    client.close();

    for _ in 0..100 {
        if client.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let event = signed(&Keys::generate(), InsightType::TronBlock, Severity::Info, json!({}), "block_metrics");
    assert!(matches!(client.publish(&event).await, Err(RelayError::Disconnected)));
}

#[tokio::test]
async fn tronostr_client_filters_transfers_and_alerts() {
    let (url, _state) = spawn_relay(false).await;
    let mut client = TronostrClient::with_config(
        vec![url.clone(), "ws://127.0.0.1:1".into()],
        DEFAULT_KIND_BASE,
        fast_config(),
    );
    assert_eq!(client.connect().await, 1);

    let mut transfers = client.on_transfer();
    let mut alerts = client.on_alerts();
    // let the REQs reach the relay before publishing
    tokio::time::sleep(Duration::from_millis(100)).await;

    let keys = Keys::generate();
    let publisher = RelayClient::connect(url.as_str(), fast_config()).await.unwrap();
    let block = signed(&keys, InsightType::TronBlock, Severity::Info, json!({"height": 9}), "block_metrics");
    let medium = signed(&keys, InsightType::UsdtTransfer, Severity::Medium, json!({"amount": 600000.0}), "whale_transfer");
    // right kind, wrong chain: passes the relay filter, dropped locally
    let foreign = signed_on(&keys, "eth", InsightType::TrxTransfer, Severity::High, json!({"amount": 1.0}), "whale_transfer");
    let high = signed(&keys, InsightType::TrxTransfer, Severity::High, json!({"amount": 1.0e7}), "whale_transfer");
    for event in [&block, &medium, &foreign, &high] {
        publisher.publish(event).await.unwrap();
    }

    let first = recv(&mut transfers).await;
    assert_eq!(first.event, medium);
    assert_eq!(first.parsed_content, Some(json!({"amount": 600000.0})));
    assert_eq!(first.relay, url);
    assert_eq!(recv(&mut transfers).await.event, high);

    let alert = recv(&mut alerts).await;
    assert_eq!(alert.event, high);
    assert!(alerts.try_recv().is_err());

    client.close();
}
