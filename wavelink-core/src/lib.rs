//! Core wire protocol types and codec for wavelink
//!
//! This crate provides the foundation of the wavelink realtime client:
//!
//! - **Protocol**: the command/reply/push data structures of the
//!   line-delimited JSON wire format
//! - **Codec**: frame splitting, command encoding and key-driven reply
//!   decoding, including heartbeat detection
//! - **Errors**: the error taxonomy shared by the transport, client and
//!   subscription layers
//!
//! The crate is transport-agnostic: it knows how to turn commands into bytes
//! and bytes into replies, but not how those bytes move. The
//! `wavelink-client` crate builds the WebSocket connection engine on top of
//! this foundation.

pub mod codec;
pub mod error;
pub mod protocol;

pub use error::{close, codes, Error, Result};
pub use protocol::{
    ClientInfo, Command, ConnectRequest, ConnectResult, ErrorReply, Publication, PublishRequest,
    PublishResult, Push, PushKind, RefreshRequest, RefreshResult, Reply, ReplyResult, Request,
    SendRequest, SubscribeRequest, SubscribeResult, UnsubscribeRequest, UnsubscribeResult,
};
