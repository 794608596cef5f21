//! Codec for the line-delimited JSON wire format
//!
//! A WebSocket text frame carries one or more JSON objects joined by `\n`;
//! single-object and multi-object frames are interchangeable and empty lines
//! are skipped. The empty object `{}` is the bidirectional heartbeat.
//!
//! Decoding is per line and key-driven: the presence of one of the result
//! keys (`connect`, `subscribe`, `unsubscribe`, `publish`, `refresh`, `push`,
//! `error`) selects the reply variant. A malformed line must never fail the
//! rest of a frame, so callers iterate [`split_frames`] and decode each line
//! independently, surfacing per-line errors while continuing.

use crate::error::{Error, Result};
use crate::protocol::{Command, Push, PushKind, Reply, ReplyResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The heartbeat frame, sent verbatim as a pong when a ping is owed.
pub const PING_FRAME: &str = "{}";

/// One decoded line off the wire.
#[derive(Debug, Clone)]
pub enum Frame {
    /// The empty object `{}`: a heartbeat from the server.
    Ping,
    Reply(Reply),
}

/// Encode a command as a single JSON object with no trailing newline.
pub fn encode_command(cmd: &Command) -> Result<String> {
    serde_json::to_string(cmd).map_err(|e| Error::Serialization(e.to_string()))
}

/// Iterate the non-empty lines of a frame.
pub fn split_frames(data: &str) -> impl Iterator<Item = &str> {
    data.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Decode one line into a heartbeat or a reply.
pub fn decode_frame(line: &str) -> Result<Frame> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Error::Transport(format!("json parse error: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::Transport("reply is not a JSON object".into()))?;

    if object.is_empty() {
        return Ok(Frame::Ping);
    }

    let id = object.get("id").and_then(Value::as_u64).unwrap_or(0) as u32;

    let result = if let Some(body) = object.get("connect") {
        ReplyResult::Connect(decode_body(body)?)
    } else if let Some(body) = object.get("subscribe") {
        ReplyResult::Subscribe(decode_body(body)?)
    } else if let Some(body) = object.get("unsubscribe") {
        ReplyResult::Unsubscribe(decode_body(body)?)
    } else if let Some(body) = object.get("publish") {
        ReplyResult::Publish(decode_body(body)?)
    } else if let Some(body) = object.get("refresh") {
        ReplyResult::Refresh(decode_body(body)?)
    } else if let Some(body) = object.get("push") {
        ReplyResult::Push(decode_push(body)?)
    } else if let Some(body) = object.get("error") {
        ReplyResult::Error(decode_body(body)?)
    } else {
        return Err(Error::Transport(format!("unrecognized reply: {line}")));
    };

    Ok(Frame::Reply(Reply { id, result }))
}

fn decode_body<T: DeserializeOwned>(body: &Value) -> Result<T> {
    serde_json::from_value(body.clone()).map_err(|e| Error::Transport(format!("bad reply body: {e}")))
}

fn decode_push(body: &Value) -> Result<Push> {
    let object = body
        .as_object()
        .ok_or_else(|| Error::Transport("push is not a JSON object".into()))?;
    let channel = object
        .get("channel")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let kind = if let Some(publication) = object.get("pub") {
        PushKind::Publication(decode_body(publication)?)
    } else if let Some(v) = object.get("join") {
        PushKind::Join(v.clone())
    } else if let Some(v) = object.get("leave") {
        PushKind::Leave(v.clone())
    } else if let Some(v) = object.get("message") {
        PushKind::Message(v.clone())
    } else if let Some(v) = object.get("sub") {
        PushKind::Subscribe(v.clone())
    } else if let Some(v) = object.get("unsub") {
        PushKind::Unsubscribe(v.clone())
    } else if let Some(v) = object.get("disconnect") {
        PushKind::Disconnect(v.clone())
    } else {
        return Err(Error::Transport("push with unknown kind".into()));
    };

    Ok(Push { channel, kind })
}
