//! Common test utilities for wavelink-client integration tests
//!
//! Provides a scripted mock pub/sub server so client behavior can be tested
//! without a real broker. The server accepts connections sequentially (a
//! client only ever holds one), splits incoming frames into lines, answers
//! each line through a handler, and exposes hooks to push frames or close
//! the live connection with a chosen code.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Canned behavior for the default protocol handler.
#[derive(Debug, Clone)]
pub struct ServerBehavior {
    pub ping: u32,
    pub pong: bool,
    pub expires: bool,
    pub ttl: u32,
    pub server_subs: Vec<String>,
    /// Body returned for every subscribe command (and for server-side
    /// subscriptions inside the connect result).
    pub subscribe_result: Value,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            ping: 25,
            pong: false,
            expires: false,
            ttl: 0,
            server_subs: Vec::new(),
            subscribe_result: json!({}),
        }
    }
}

/// Build a reply line for one incoming command line, mimicking a broker.
pub fn respond(behavior: &ServerBehavior, line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line).ok()?;
    let object = value.as_object()?;
    if object.is_empty() {
        // Client pong; nothing to answer.
        return None;
    }
    let id = object.get("id").and_then(Value::as_u64).unwrap_or(0);

    if object.contains_key("connect") {
        let mut subs = serde_json::Map::new();
        for channel in &behavior.server_subs {
            subs.insert(channel.clone(), behavior.subscribe_result.clone());
        }
        Some(
            json!({
                "id": id,
                "connect": {
                    "client": "mock-client-id",
                    "version": "0.0.0-mock",
                    "ping": behavior.ping,
                    "pong": behavior.pong,
                    "expires": behavior.expires,
                    "ttl": behavior.ttl,
                    "subs": subs,
                }
            })
            .to_string(),
        )
    } else if object.contains_key("subscribe") {
        Some(json!({"id": id, "subscribe": behavior.subscribe_result}).to_string())
    } else if object.contains_key("unsubscribe") {
        Some(json!({"id": id, "unsubscribe": {}}).to_string())
    } else if object.contains_key("publish") {
        Some(json!({"id": id, "publish": {}}).to_string())
    } else if object.contains_key("refresh") {
        Some(
            json!({"id": id, "refresh": {"expires": behavior.expires, "ttl": behavior.ttl}})
                .to_string(),
        )
    } else {
        // `send` and anything unknown gets no reply.
        None
    }
}

/// Mock WebSocket pub/sub server.
pub struct MockServer {
    addr: SocketAddr,
    frames: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockServer {
    /// Start a server answering with the default protocol handler.
    pub async fn start(behavior: ServerBehavior) -> Self {
        Self::with_handler(move |line| respond(&behavior, &line)).await
    }

    /// Start a server with a custom per-line handler.
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(String) -> Option<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<String>();
        let outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>> =
            Arc::new(Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));

        let outbound_slot = Arc::clone(&outbound);
        let accepted = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                accepted.fetch_add(1, Ordering::SeqCst);
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();
                let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
                *outbound_slot.lock().unwrap() = Some(out_tx);

                loop {
                    tokio::select! {
                        queued = out_rx.recv() => {
                            match queued {
                                Some(message) => {
                                    let closing = matches!(message, Message::Close(_));
                                    if write.send(message).await.is_err() || closing {
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }
                        incoming = read.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    let mut responses = Vec::new();
                                    for line in text.lines().filter(|l| !l.trim().is_empty()) {
                                        let _ = frames_tx.send(line.to_string());
                                        if let Some(response) = handler(line.to_string()) {
                                            responses.push(response);
                                        }
                                    }
                                    if !responses.is_empty()
                                        && write.send(Message::Text(responses.join("\n"))).await.is_err()
                                    {
                                        break;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            }
                        }
                    }
                }
                outbound_slot.lock().unwrap().take();
            }
        });

        Self {
            addr,
            frames: AsyncMutex::new(frames_rx),
            outbound,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// How many connections have been accepted so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next line received from the client, or panic after 5 seconds.
    pub async fn next_frame(&self) -> String {
        timeout(Duration::from_secs(5), self.frames.lock().await.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("server task ended")
    }

    /// Next line received within `wait`, if any.
    pub async fn try_next_frame(&self, wait: Duration) -> Option<String> {
        timeout(wait, self.frames.lock().await.recv())
            .await
            .ok()
            .flatten()
    }

    /// Skip frames until one whose object contains `key`; returns it parsed.
    pub async fn wait_for(&self, key: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if let Ok(value) = serde_json::from_str::<Value>(&frame) {
                if value.get(key).is_some() {
                    return value;
                }
            }
        }
    }

    /// Send a raw text frame to the live connection.
    pub fn push(&self, text: &str) {
        if let Some(tx) = self.outbound.lock().unwrap().as_ref() {
            let _ = tx.send(Message::Text(text.to_string()));
        }
    }

    /// Close the live connection with a WebSocket close code.
    pub fn close(&self, code: u16, reason: &str) {
        if let Some(tx) = self.outbound.lock().unwrap().as_ref() {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            })));
        }
    }
}

/// Record callback firings and await them with a timeout.
pub struct EventLog {
    tx: mpsc::UnboundedSender<String>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<String>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: AsyncMutex::new(rx),
        })
    }

    pub fn record(&self, event: impl Into<String>) {
        let _ = self.tx.send(event.into());
    }

    pub async fn next(&self) -> String {
        timeout(Duration::from_secs(5), self.rx.lock().await.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    pub async fn expect(&self, event: &str) {
        let got = self.next().await;
        assert_eq!(got, event);
    }

    pub async fn try_next(&self, wait: Duration) -> Option<String> {
        timeout(wait, self.rx.lock().await.recv())
            .await
            .ok()
            .flatten()
    }
}
