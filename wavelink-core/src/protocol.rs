//! Wire protocol types
//!
//! The wire is a line-delimited JSON command/reply protocol: every frame
//! carries one or more JSON objects separated by `\n`. A command is
//! `{"id": <u32>, "<request-tag>": <body>}` where the request tag is one of
//! `connect`, `subscribe`, `unsubscribe`, `publish`, `refresh`, `send`. A
//! reply mirrors this with a result keyed by `connect`, `subscribe`,
//! `unsubscribe`, `publish`, `refresh`, `push` or `error`. The empty object
//! `{}` is the bidirectional heartbeat and is handled in the codec, not here.
//!
//! Command id 0 is reserved for fire-and-forget messages (pongs and `send`):
//! the transport never records them for reply correlation. Reply id 0 marks a
//! server-initiated message (a push or a top-level error).
//!
//! Request bodies omit empty optional fields on the wire; result bodies
//! default every missing field, since servers only send what is meaningful.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// A client-to-server command: a correlation id plus one tagged request.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    pub id: u32,
    #[serde(flatten)]
    pub request: Request,
}

/// The request union. The serde external tag is the wire discriminant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Request {
    Connect(ConnectRequest),
    Subscribe(SubscribeRequest),
    Unsubscribe(UnsubscribeRequest),
    Publish(PublishRequest),
    Refresh(RefreshRequest),
    Send(SendRequest),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscribeRequest {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub recover: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub epoch: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "is_false")]
    pub positioned: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub recoverable: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub join_leave: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub delta: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnsubscribeRequest {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishRequest {
    pub channel: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendRequest {
    pub data: Value,
}

/// A server-to-client reply: correlation id plus one decoded result.
#[derive(Debug, Clone)]
pub struct Reply {
    pub id: u32,
    pub result: ReplyResult,
}

/// The result union. Decoding is key-driven: the presence of one of the
/// result keys on the wire object selects the variant (see the codec).
#[derive(Debug, Clone)]
pub enum ReplyResult {
    Connect(ConnectResult),
    Subscribe(SubscribeResult),
    Unsubscribe(UnsubscribeResult),
    Publish(PublishResult),
    Refresh(RefreshResult),
    Push(Push),
    Error(ErrorReply),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectResult {
    pub client: String,
    pub version: String,
    pub expires: bool,
    pub ttl: u32,
    pub data: Option<Value>,
    pub subs: HashMap<String, SubscribeResult>,
    /// Ping interval announced by the server, in seconds.
    pub ping: u32,
    /// Whether the server expects the client to answer pings.
    pub pong: bool,
    pub session: String,
    pub node: String,
    pub time: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscribeResult {
    pub expires: bool,
    pub ttl: u32,
    pub recoverable: bool,
    pub epoch: String,
    /// Publications missed while disconnected, replayed on (re)subscribe.
    pub publications: Vec<Publication>,
    pub recovered: bool,
    pub offset: u64,
    pub positioned: bool,
    pub data: Option<Value>,
    pub was_recovering: bool,
    pub delta: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnsubscribeResult {}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublishResult {}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefreshResult {
    pub client: String,
    pub version: String,
    pub expires: bool,
    pub ttl: u32,
}

/// A server-initiated frame scoped to a channel.
#[derive(Debug, Clone)]
pub struct Push {
    pub channel: String,
    pub kind: PushKind,
}

/// Push payload variants. Publications are fully supported; the remaining
/// kinds are decoded tolerantly so an active server feature does not break
/// the read loop, and are dropped by the router.
#[derive(Debug, Clone)]
pub enum PushKind {
    Publication(Publication),
    Join(Value),
    Leave(Value),
    Message(Value),
    Subscribe(Value),
    Unsubscribe(Value),
    Disconnect(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Publication {
    pub offset: u64,
    pub data: Value,
    pub info: Option<ClientInfo>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    pub user: String,
    pub client: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorReply {
    pub code: u32,
    pub message: String,
    pub temporary: bool,
}
