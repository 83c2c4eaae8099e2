/// feed.rs – Streaming price feed over the backend WebSocket channel.
///
/// Responsibilities:
///  - Keep one long-lived connection open, reconnecting with backoff
///  - Apply inbound tickers to an in-memory symbol → latest ticker map
///  - Publish connection status (connected / reconnecting / attempt)
///  - Forward system events (halt state, order updates, risk alerts)
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::models::{Order, TickerSnapshot};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HaltStatus {
    pub is_halted: bool,
    #[serde(default)]
    pub halt_reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiskAlert {
    #[serde(default)]
    pub severity: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedMessage {
    Ticker(TickerSnapshot),
    HaltStatus(HaltStatus),
    OrderUpdate(Order),
    RiskAlert(RiskAlert),
}

const KNOWN_TYPES: [&str; 4] = ["ticker", "halt_status", "order_update", "risk_alert"];

/// Events from the sibling system channel, forwarded to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    Halt(HaltStatus),
    OrderUpdate(Order),
    RiskAlert(RiskAlert),
}

/// Parse one text frame. `Ok(None)` means a well-formed message of a type
/// this client does not consume.
pub fn parse_feed_message(text: &str) -> Result<Option<FeedMessage>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value.get("type").and_then(|v| v.as_str()).unwrap_or("");
    if !KNOWN_TYPES.contains(&kind) {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some)
}

// ---------------------------------------------------------------------------
// Connection status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub is_reconnecting: bool,
    /// Consecutive failed or dropped connections since the last success.
    pub reconnect_attempt: u32,
}

impl ConnectionStatus {
    pub fn connected() -> Self {
        Self {
            is_connected: true,
            is_reconnecting: false,
            reconnect_attempt: 0,
        }
    }

    /// Socket open but nothing received yet. The attempt counter is kept
    /// until the server proves the connection useful by sending data.
    pub fn opened(self) -> Self {
        Self {
            is_connected: true,
            is_reconnecting: false,
            reconnect_attempt: self.reconnect_attempt,
        }
    }

    /// Status after the connection dropped or could not be opened.
    pub fn dropped(self) -> Self {
        Self {
            is_connected: false,
            is_reconnecting: true,
            reconnect_attempt: self.reconnect_attempt.saturating_add(1),
        }
    }
}

// ---------------------------------------------------------------------------
// TickerStream
// ---------------------------------------------------------------------------

/// Latest streamed ticker per symbol. Written only by the feed task;
/// everyone else reads snapshots.
#[derive(Debug, Clone, Default)]
pub struct TickerStream {
    tickers: Arc<RwLock<HashMap<String, TickerSnapshot>>>,
}

impl TickerStream {
    /// Last write wins per symbol; applying the same ticker twice leaves the
    /// map as applying it once.
    pub fn apply(&self, ticker: TickerSnapshot) {
        let mut map = self
            .tickers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        map.insert(ticker.symbol.clone(), ticker);
    }

    pub fn snapshot(&self) -> HashMap<String, TickerSnapshot> {
        self.tickers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.tickers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .map(|t| t.price)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tickers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// FeedClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub ws_url: String,
    /// Symbols to subscribe to; empty subscribes to everything.
    pub symbols: Vec<String>,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

/// Running feed. Dropping the handle disconnects.
pub struct FeedHandle {
    pub stream: TickerStream,
    status: watch::Receiver<ConnectionStatus>,
    events: broadcast::Sender<SystemEvent>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.events.subscribe()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the WebSocket listener as a background tokio task.
///
/// The task reconnects on every disconnection: the delay starts at
/// `reconnect_initial`, doubles per consecutive failure up to
/// `reconnect_max`, and resets once a connection delivered data.
pub fn start(options: FeedOptions) -> FeedHandle {
    let stream = TickerStream::default();
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
    let (events_tx, _) = broadcast::channel::<SystemEvent>(256);

    let task_stream = stream.clone();
    let task_events = events_tx.clone();
    let task = tokio::spawn(async move {
        let mut backoff = options.reconnect_initial;
        loop {
            match ws_run(&options, &task_stream, &status_tx, &task_events).await {
                Ok(true) => {
                    info!("Price feed disconnected after receiving data – reconnecting");
                    backoff = options.reconnect_initial;
                }
                Ok(false) => {
                    info!("Price feed closed with no data");
                }
                Err(e) => {
                    warn!("Price feed error: {e:#} – reconnecting in {backoff:?}");
                }
            }
            status_tx.send_modify(|s| *s = s.dropped());
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(options.reconnect_max);
        }
    });

    FeedHandle {
        stream,
        status: status_rx,
        events: events_tx,
        task,
    }
}

// ---------------------------------------------------------------------------
// WebSocket internals
// ---------------------------------------------------------------------------

/// Returns `Ok(true)` if at least one message was received (so the caller
/// can reset backoff), `Ok(false)` for a close with no messages, and `Err`
/// for connection failures.
async fn ws_run(
    options: &FeedOptions,
    stream: &TickerStream,
    status: &watch::Sender<ConnectionStatus>,
    events: &broadcast::Sender<SystemEvent>,
) -> Result<bool> {
    info!("Connecting to price feed: {}", options.ws_url);

    let (mut ws, _) = connect_async(options.ws_url.as_str())
        .await
        .context("WebSocket connect")?;
    status.send_modify(|s| *s = s.opened());

    let sub = json!({
        "type": "subscribe",
        "channels": ["tickers", "system"],
        "symbols": options.symbols,
    });
    ws.send(Message::Text(sub.to_string())).await?;
    info!("Subscribed to {} symbol(s)", options.symbols.len());

    let mut received_any = false;
    while let Some(msg) = ws.next().await {
        let msg = msg.context("WebSocket read error")?;
        match msg {
            Message::Text(text) => {
                if !received_any {
                    received_any = true;
                    status.send_replace(ConnectionStatus::connected());
                }
                handle_ws_text(&text, stream, events);
            }
            Message::Ping(data) => {
                if let Err(e) = ws.send(Message::Pong(data)).await {
                    debug!("Pong send failed: {e}");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(received_any)
}

fn handle_ws_text(text: &str, stream: &TickerStream, events: &broadcast::Sender<SystemEvent>) {
    let msg = match parse_feed_message(text) {
        Ok(Some(msg)) => msg,
        Ok(None) => {
            debug!("Ignoring feed message of unknown type");
            return;
        }
        Err(e) => {
            warn!("Malformed feed message: {e}");
            return;
        }
    };

    let event = match msg {
        FeedMessage::Ticker(ticker) => {
            debug!("Ticker {} @ {}", ticker.symbol, ticker.price);
            stream.apply(ticker);
            return;
        }
        FeedMessage::HaltStatus(halt) => SystemEvent::Halt(halt),
        FeedMessage::OrderUpdate(order) => SystemEvent::OrderUpdate(order),
        FeedMessage::RiskAlert(alert) => SystemEvent::RiskAlert(alert),
    };
    // No subscribers is fine; the event is only of interest to a live UI.
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_message() {
        let msg = parse_feed_message(
            r#"{"type":"ticker","data":{"symbol":"BTC/USDT","price":50000.5}}"#,
        )
        .unwrap();
        match msg {
            Some(FeedMessage::Ticker(t)) => {
                assert_eq!(t.symbol, "BTC/USDT");
                assert_eq!(t.price, 50000.5);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_halt_status() {
        let msg = parse_feed_message(
            r#"{"type":"halt_status","data":{"is_halted":true,"halt_reason":"drawdown"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Some(FeedMessage::HaltStatus(HaltStatus {
                is_halted: true,
                halt_reason: "drawdown".into(),
            }))
        );
    }

    #[test]
    fn unknown_type_is_ignored() {
        assert_eq!(parse_feed_message(r#"{"type":"heartbeat"}"#).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_feed_message("not json").is_err());
        assert!(parse_feed_message(r#"{"type":"ticker","data":{"price":"x"}}"#).is_err());
    }

    #[test]
    fn drop_increments_attempt_and_connect_resets() {
        let s = ConnectionStatus::default().dropped().dropped();
        assert!(s.is_reconnecting);
        assert!(!s.is_connected);
        assert_eq!(s.reconnect_attempt, 2);
        assert_eq!(ConnectionStatus::connected().reconnect_attempt, 0);
    }

    #[test]
    fn opening_a_socket_keeps_the_attempt_count() {
        let s = ConnectionStatus::default().dropped().dropped().opened();
        assert!(s.is_connected);
        assert!(!s.is_reconnecting);
        assert_eq!(s.reconnect_attempt, 2);
        assert_eq!(s.dropped().reconnect_attempt, 3);
    }

    #[test]
    fn applying_a_ticker_twice_matches_applying_it_once() {
        let ticker: TickerSnapshot =
            serde_json::from_str(r#"{"symbol":"BTC/USDT","price":50000.5}"#).unwrap();

        let once = TickerStream::default();
        once.apply(ticker.clone());

        let twice = TickerStream::default();
        twice.apply(ticker.clone());
        twice.apply(ticker);

        assert_eq!(twice.snapshot(), once.snapshot());
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn ticker_messages_update_stream_and_events_are_forwarded() {
        let stream = TickerStream::default();
        let (tx, mut rx) = broadcast::channel(8);
        handle_ws_text(
            r#"{"type":"ticker","data":{"symbol":"ETH/USDT","price":3000}}"#,
            &stream,
            &tx,
        );
        handle_ws_text(
            r#"{"type":"risk_alert","data":{"severity":"high","message":"VaR breach"}}"#,
            &stream,
            &tx,
        );
        assert_eq!(stream.price("ETH/USDT"), Some(3000.0));
        match rx.try_recv().unwrap() {
            SystemEvent::RiskAlert(a) => assert_eq!(a.message, "VaR breach"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
