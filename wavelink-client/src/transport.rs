//! WebSocket transport
//!
//! The connection engine: one connect pipeline per attempt, a read loop per
//! established socket, a coalescing write queue, reply bookkeeping, and the
//! reconnect/ping/refresh timers.
//!
//! # Lifecycle
//!
//! `initial_connect` validates the configuration and URL, then transitions
//! Disconnected → Connecting and starts the first attempt. Every attempt
//! resolves a token (static or via the provider), rebuilds the WebSocket and
//! sends the connect command; the resulting connect reply flips the state to
//! Connected. Failures reschedule a new attempt through the backoff timer.
//! Close codes at or above the terminal threshold, token-provider failures
//! and explicit `disconnect` calls move the transport to Disconnected and
//! cancel everything.
//!
//! # Superseded connections
//!
//! Each attempt increments a generation counter and the read loop it spawns
//! carries that generation. Reconnects and disconnects bump the counter, so
//! a read loop (or a handshake still in flight) that lost the race observes
//! a newer generation and exits silently instead of double-reporting.
//!
//! # Write coalescing
//!
//! `send` appends the encoded command to a pending buffer (newline-joined)
//! and posts a flush. The flush swaps the buffer out atomically, writes it
//! as one text frame, and only then records the written commands for reply
//! correlation, so a command is in `sent_commands` only after its bytes hit
//! the socket. At most one write is in flight at any time.

use crate::backoff::ReconnectBackoff;
use crate::config::{ClientConfig, DEFAULT_CLIENT_NAME};
use crate::timer::TimerSlot;
use crate::url::{parse_url, UrlComponents};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wavelink_core::codec::{self, Frame};
use wavelink_core::protocol::{
    Command, ConnectRequest, ConnectResult, RefreshRequest, Reply, ReplyResult, Request,
};
use wavelink_core::{close, codes, Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connection lifecycle state. Only the transport mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Event hooks wired once at construction. The client orchestrator is the
/// single listener and fans events out to user callbacks and subscriptions.
#[derive(Default)]
pub struct TransportHooks {
    pub on_connecting: Option<Box<dyn Fn(&Error) + Send + Sync>>,
    pub on_connected: Option<Box<dyn Fn(&ConnectResult) + Send + Sync>>,
    pub on_disconnected: Option<Box<dyn Fn(&Error) + Send + Sync>>,
    pub on_reply: Option<Box<dyn Fn(&Reply) + Send + Sync>>,
    pub on_error: Option<Box<dyn Fn(&Error) + Send + Sync>>,
}

#[derive(Default)]
struct WriteQueue {
    /// Encoded frames awaiting the next flush, newline-joined.
    pending_writes: String,
    /// Commands whose bytes sit in `pending_writes`, in order.
    pending_commands: Vec<Command>,
    /// True while a write is in flight; guards against concurrent flushes.
    is_writing: bool,
}

pub struct Transport {
    config: ClientConfig,
    raw_url: String,
    backoff: ReconnectBackoff,
    hooks: TransportHooks,

    state: Mutex<ConnectionState>,
    url: Mutex<Option<UrlComponents>>,
    token: Mutex<String>,
    client_id: Mutex<String>,
    ping_interval: Mutex<Duration>,
    reconnect_attempts: AtomicU32,
    command_id: AtomicU32,
    generation: AtomicU64,
    runtime: Mutex<Option<tokio::runtime::Handle>>,

    sink: AsyncMutex<Option<WsSink>>,
    queue: Mutex<WriteQueue>,
    sent_commands: Mutex<HashMap<u32, Command>>,

    reconnect_timer: TimerSlot,
    ping_timer: TimerSlot,
    refresh_timer: TimerSlot,
}

impl Transport {
    pub fn new(url: impl Into<String>, config: ClientConfig, hooks: TransportHooks) -> Arc<Self> {
        let backoff = ReconnectBackoff::new(config.min_reconnect_delay, config.max_reconnect_delay);
        let token = config.token.clone();
        Arc::new(Self {
            config,
            raw_url: url.into(),
            backoff,
            hooks,
            state: Mutex::new(ConnectionState::Disconnected),
            url: Mutex::new(None),
            token: Mutex::new(token),
            client_id: Mutex::new(String::new()),
            ping_interval: Mutex::new(Duration::ZERO),
            reconnect_attempts: AtomicU32::new(0),
            command_id: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            runtime: Mutex::new(None),
            sink: AsyncMutex::new(None),
            queue: Mutex::new(WriteQueue::default()),
            sent_commands: Mutex::new(HashMap::new()),
            reconnect_timer: TimerSlot::new(),
            ping_timer: TimerSlot::new(),
            refresh_timer: TimerSlot::new(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Id assigned to the connection by the server, empty until connected.
    pub fn client_id(&self) -> String {
        self.client_id.lock().unwrap().clone()
    }

    /// Ids of commands written to the socket and still awaiting a reply.
    pub fn sent_command_ids(&self) -> Vec<u32> {
        self.sent_commands.lock().unwrap().keys().copied().collect()
    }

    /// Next command id: monotonically increasing, never 0 (0 is reserved
    /// for fire-and-forget frames).
    pub fn next_command_id(&self) -> u32 {
        loop {
            let id = self.command_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return id;
            }
        }
    }

    /// Validate configuration and URL, then start connecting.
    ///
    /// Fails with `NotDisconnected` unless the transport is idle, and with a
    /// configuration error for bad delays, an over-long name/version or a
    /// malformed URL.
    pub fn initial_connect(self: &Arc<Self>) -> Result<()> {
        if self.state() != ConnectionState::Disconnected {
            return Err(Error::NotDisconnected);
        }
        self.config.validate()?;
        let components = parse_url(&self.raw_url)?;
        *self.url.lock().unwrap() = Some(components);

        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Config("connect must be called from within a tokio runtime".into())
        })?;
        *self.runtime.lock().unwrap() = Some(handle);

        self.set_state(
            ConnectionState::Connecting,
            &Error::lifecycle("connect called"),
        );
        let transport = Arc::clone(self);
        self.spawn(async move { transport.connect_attempt().await });
        Ok(())
    }

    /// Force Disconnected: close the socket, cancel all timers, go silent.
    pub fn disconnect(self: &Arc<Self>, error: Error) {
        self.generation.fetch_add(1, Ordering::Relaxed);
        self.set_state(ConnectionState::Disconnected, &error);
    }

    /// Queue a command for the next flush. Commands with id 0 are
    /// fire-and-forget and are never recorded for reply correlation.
    pub fn send(self: &Arc<Self>, command: Command) -> Result<()> {
        let encoded = codec::encode_command(&command)?;
        self.enqueue(encoded, Some(command));
        Ok(())
    }

    fn enqueue(self: &Arc<Self>, frame: String, command: Option<Command>) {
        {
            let mut queue = self.queue.lock().unwrap();
            if !queue.pending_writes.is_empty() {
                queue.pending_writes.push('\n');
            }
            queue.pending_writes.push_str(&frame);
            if let Some(command) = command {
                if command.id != 0 {
                    queue.pending_commands.push(command);
                }
            }
        }
        let transport = Arc::clone(self);
        self.spawn(async move { transport.flush().await });
    }

    async fn flush(self: Arc<Self>) {
        loop {
            let mut sink_guard = self.sink.lock().await;
            let Some(sink) = sink_guard.as_mut() else {
                // No socket yet; the queue drains once a connection is up.
                return;
            };

            let (batch, commands) = {
                let mut queue = self.queue.lock().unwrap();
                if queue.is_writing || queue.pending_writes.is_empty() {
                    return;
                }
                queue.is_writing = true;
                (
                    mem::take(&mut queue.pending_writes),
                    mem::take(&mut queue.pending_commands),
                )
            };

            tracing::debug!(message = %batch, "sending frame");
            let written = sink.send(Message::Text(batch)).await;
            drop(sink_guard);
            self.queue.lock().unwrap().is_writing = false;

            match written {
                Ok(()) => {
                    let mut sent = self.sent_commands.lock().unwrap();
                    for command in commands {
                        sent.insert(command.id, command);
                    }
                }
                Err(e) => {
                    // Tolerated: the read loop notices the dead socket.
                    self.emit_error(&Error::Transport(e.to_string()));
                    return;
                }
            }
        }
    }

    async fn connect_attempt(self: Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let mut token = self.token.lock().unwrap().clone();
        if token.is_empty() {
            match self.refresh_token().await {
                Some(fresh) => token = fresh,
                None => return,
            }
        }
        if self.is_stale(generation) {
            return;
        }

        self.close_socket().await;
        {
            let mut queue = self.queue.lock().unwrap();
            queue.pending_writes.clear();
            queue.pending_commands.clear();
        }
        self.sent_commands.lock().unwrap().clear();

        let endpoint = match self.url.lock().unwrap().clone() {
            Some(components) => components.endpoint(),
            None => return,
        };

        tracing::debug!(url = %endpoint, "opening websocket");
        let stream = match connect_async(&endpoint).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                if self.is_stale(generation) {
                    return;
                }
                let cause = Error::Transport(e.to_string());
                self.emit_error(&cause);
                self.reconnect(cause);
                return;
            }
        };
        if self.is_stale(generation) {
            return;
        }

        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);

        self.send_connect_command(token);
        let transport = Arc::clone(&self);
        self.spawn(async move { transport.read_loop(source, generation).await });
    }

    fn send_connect_command(self: &Arc<Self>, token: String) {
        let request = ConnectRequest {
            token: (!token.is_empty()).then_some(token),
            data: None,
            name: if self.config.name.is_empty() {
                DEFAULT_CLIENT_NAME.to_string()
            } else {
                self.config.name.clone()
            },
            version: (!self.config.version.is_empty()).then(|| self.config.version.clone()),
        };
        let command = Command {
            id: self.next_command_id(),
            request: Request::Connect(request),
        };
        if let Err(e) = self.send(command) {
            self.emit_error(&e);
        }
    }

    async fn read_loop(self: Arc<Self>, mut source: WsSource, generation: u64) {
        while let Some(message) = source.next().await {
            if self.is_stale(generation) {
                return;
            }
            match message {
                Ok(Message::Text(text)) => self.handle_incoming(&text),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                        None => (1005, String::new()),
                    };
                    tracing::debug!(code, reason = %reason, "server closed the connection");
                    let cause = Error::Closed { code, reason };
                    if code >= close::TERMINAL_MIN {
                        self.disconnect(cause);
                    } else {
                        self.reconnect(cause);
                    }
                    return;
                }
                // WebSocket-level ping/pong and binary frames are not part
                // of the protocol; tungstenite answers pings on its own.
                Ok(_) => {}
                Err(e) => {
                    self.reconnect(Error::Transport(e.to_string()));
                    return;
                }
            }
        }
        if !self.is_stale(generation) {
            self.reconnect(Error::Transport("connection reset by peer".into()));
        }
    }

    fn handle_incoming(self: &Arc<Self>, text: &str) {
        tracing::debug!(message = %text, "received frame");
        for line in codec::split_frames(text) {
            match codec::decode_frame(line) {
                Ok(Frame::Ping) => self.handle_ping(),
                Ok(Frame::Reply(reply)) => self.handle_reply(reply),
                Err(e) => self.emit_error(&e),
            }
        }
    }

    /// A heartbeat owes a pong only when the ping timer was armed, i.e. the
    /// server announced pings and we were waiting for one.
    fn handle_ping(self: &Arc<Self>) {
        if !self.ping_timer.cancel() {
            return;
        }
        self.start_ping_timer();
        self.enqueue(codec::PING_FRAME.to_string(), None);
    }

    fn handle_reply(self: &Arc<Self>, reply: Reply) {
        match &reply.result {
            ReplyResult::Error(error) if error.code == codes::TOKEN_EXPIRED => {
                // The cached token is stale; the next attempt refetches one.
                self.token.lock().unwrap().clear();
                self.generation.fetch_add(1, Ordering::Relaxed);
                let transport = Arc::clone(self);
                self.spawn(async move { transport.close_socket().await });
                self.reconnect(Error::Server {
                    code: error.code,
                    message: error.message.clone(),
                    temporary: error.temporary,
                });
            }
            ReplyResult::Connect(result) => {
                *self.client_id.lock().unwrap() = result.client.clone();
                if result.pong {
                    *self.ping_interval.lock().unwrap() =
                        Duration::from_secs(u64::from(result.ping)) + self.config.max_ping_delay;
                    self.start_ping_timer();
                }
                if result.expires {
                    self.start_refresh_timer(result.ttl);
                }
                self.set_connected(result);
            }
            ReplyResult::Refresh(result) => {
                if result.expires {
                    self.start_refresh_timer(result.ttl);
                }
            }
            _ => {}
        }

        if let Some(on_reply) = &self.hooks.on_reply {
            on_reply(&reply);
        }
        self.sent_commands.lock().unwrap().remove(&reply.id);
    }

    fn reconnect(self: &Arc<Self>, cause: Error) {
        // Invalidate the current socket's read loop before scheduling.
        self.generation.fetch_add(1, Ordering::Relaxed);
        self.set_state(ConnectionState::Connecting, &cause);

        let attempts = self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        let delay = self.backoff.delay(attempts);
        tracing::debug!(
            attempt = attempts + 1,
            delay_ms = delay.as_millis() as u64,
            cause = %cause,
            "scheduling reconnect"
        );

        let transport = Arc::clone(self);
        self.reconnect_timer
            .arm(delay, async move { transport.connect_attempt().await });
    }

    async fn refresh_token(self: &Arc<Self>) -> Option<String> {
        let Some(provider) = self.config.get_token.clone() else {
            self.emit_error(&Error::Transport(
                "a token provider must be set to obtain connection tokens".into(),
            ));
            self.disconnect(Error::Unauthorized("unauthorized".into()));
            return None;
        };
        match provider().await {
            Ok(token) => {
                *self.token.lock().unwrap() = token.clone();
                Some(token)
            }
            Err(e) => {
                self.emit_error(&Error::Transport(format!("token provider failed: {e}")));
                self.disconnect(Error::Unauthorized("unauthorized".into()));
                None
            }
        }
    }

    fn start_ping_timer(self: &Arc<Self>) {
        let interval = *self.ping_interval.lock().unwrap();
        let transport = Arc::clone(self);
        self.ping_timer.arm(interval, async move {
            tracing::warn!("no ping from server within the expected interval");
            transport.reconnect(Error::NoPing);
        });
    }

    fn start_refresh_timer(self: &Arc<Self>, ttl_seconds: u32) {
        let delay = Duration::from_secs(u64::from(ttl_seconds))
            .saturating_sub(self.config.refresh_before_expiry);
        let transport = Arc::clone(self);
        self.refresh_timer.arm(delay, async move {
            let Some(token) = transport.refresh_token().await else {
                return;
            };
            let command = Command {
                id: transport.next_command_id(),
                request: Request::Refresh(RefreshRequest { token }),
            };
            if let Err(e) = transport.send(command) {
                transport.emit_error(&e);
            }
        });
    }

    async fn close_socket(&self) {
        let mut sink = self.sink.lock().await;
        if let Some(mut sink) = sink.take() {
            let _ = sink.close().await;
        }
    }

    fn set_state(self: &Arc<Self>, new_state: ConnectionState, cause: &Error) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == new_state {
                return;
            }
            *state = new_state;
        }
        match new_state {
            ConnectionState::Connecting => {
                self.reconnect_attempts.store(0, Ordering::Relaxed);
                self.ping_timer.cancel();
                self.refresh_timer.cancel();
                if let Some(on_connecting) = &self.hooks.on_connecting {
                    on_connecting(cause);
                }
            }
            ConnectionState::Disconnected => {
                self.reconnect_timer.cancel();
                self.ping_timer.cancel();
                self.refresh_timer.cancel();
                let transport = Arc::clone(self);
                self.spawn(async move { transport.close_socket().await });
                if let Some(on_disconnected) = &self.hooks.on_disconnected {
                    on_disconnected(cause);
                }
            }
            // Connected is entered through `set_connected`, which carries
            // the connect result instead of an error.
            ConnectionState::Connected => {}
        }
    }

    fn set_connected(&self, result: &ConnectResult) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Connected {
                return;
            }
            *state = ConnectionState::Connected;
        }
        if let Some(on_connected) = &self.hooks.on_connected {
            on_connected(result);
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Relaxed) != generation
    }

    fn emit_error(&self, error: &Error) {
        tracing::debug!(error = %error, "transport error");
        if let Some(on_error) = &self.hooks.on_error {
            on_error(error);
        }
    }

    /// Spawn on the runtime captured at connect time, falling back to the
    /// ambient runtime. Outside any runtime (e.g. during drop on a foreign
    /// thread) the task is skipped; the process teardown closes the socket.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let captured = self.runtime.lock().unwrap().clone();
        if let Some(handle) = captured {
            handle.spawn(future);
        } else if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(future);
        } else {
            tracing::debug!("no tokio runtime available; transport task skipped");
        }
    }
}
