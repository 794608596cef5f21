//! Error types for wavelink
//!
//! A single `Error` enum spans every failure surface of the client:
//!
//! - **Config**: invalid URL, invalid delay bounds, over-long name/version.
//!   Returned synchronously from `connect` and never raised again.
//! - **Transport**: I/O, TLS, WebSocket handshake, JSON parse. Emitted on the
//!   error callback; the transport either retries or tears down.
//! - **Server**: an error reply from the server, keyed by numeric code.
//! - **State**: an operation attempted in the wrong connection or
//!   subscription state, returned synchronously from the offending call.
//! - **Auth**: `Unauthorized` is terminal and moves the client to
//!   Disconnected; an expired token (code 109) is recovered internally by
//!   reconnecting with a fresh token.
//!
//! Server error codes and WebSocket close codes used by the protocol live in
//! the [`codes`] and [`close`] modules.

use thiserror::Error;

/// Result type for wavelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// All error conditions surfaced by the client
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid configuration: bad URL, bad delay bounds, over-long
    /// name/version. Only produced by `connect` before any I/O happens.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure: I/O, TLS, WebSocket handshake or a JSON
    /// parse error on an incoming line.
    #[error("transport error: {0}")]
    Transport(String),

    /// A value could not be encoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An error reply received from the server.
    ///
    /// `temporary` mirrors the wire flag: the server considers the condition
    /// retryable.
    #[error("server error {code}: {message}")]
    Server {
        code: u32,
        message: String,
        temporary: bool,
    },

    /// The connection was closed with a WebSocket close code.
    ///
    /// Codes at or above [`close::TERMINAL_MIN`] are terminal and suppress
    /// reconnection. Code 0 carries benign lifecycle notifications such as
    /// "connect called".
    #[error("{reason} (close code {code})")]
    Closed { code: u16, reason: String },

    /// Token acquisition failed or no token source is available. Terminal:
    /// the client moves to Disconnected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server announced pings but none arrived within the expected
    /// interval; the connection is presumed dead.
    #[error("no ping received from server")]
    NoPing,

    /// Operation requires a connected client.
    #[error("not connected")]
    NotConnected,

    /// Operation requires a disconnected client.
    #[error("not disconnected")]
    NotDisconnected,

    /// Operation requires an active subscription on the channel.
    #[error("not subscribed")]
    NotSubscribed,

    /// `subscribe` called while a subscribe is already in flight.
    #[error("already subscribing to channel {0}")]
    AlreadySubscribing(String),

    /// `subscribe` called on an already established subscription.
    #[error("already subscribed to channel {0}")]
    AlreadySubscribed(String),
}

impl Error {
    /// Benign lifecycle notification carried on connection callbacks.
    pub fn lifecycle(reason: impl Into<String>) -> Self {
        Error::Closed {
            code: 0,
            reason: reason.into(),
        }
    }

    /// True when this error is a server close that must not be retried.
    pub fn is_terminal_close(&self) -> bool {
        matches!(self, Error::Closed { code, .. } if *code >= close::TERMINAL_MIN)
    }
}

/// Server error codes carried in error replies.
///
/// The full set depends on the server; these are the codes the client
/// reacts to or that callers commonly match on.
pub mod codes {
    pub const PERMISSION_DENIED: u32 = 103;
    pub const ALREADY_SUBSCRIBED: u32 = 105;
    /// Recovered internally: the client drops its cached token, reconnects
    /// and fetches a fresh one.
    pub const TOKEN_EXPIRED: u32 = 109;
}

/// WebSocket close codes used by the protocol.
pub mod close {
    pub const SHUTDOWN: u16 = 3001;
    pub const BAD_REQUEST: u16 = 3501;
    pub const FORCE_DISCONNECT: u16 = 3503;
    pub const NOT_AVAILABLE: u16 = 3508;

    /// Close codes at or above this value are terminal: do not reconnect.
    pub const TERMINAL_MIN: u16 = 3500;
}
