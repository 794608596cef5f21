//! Realtime pub/sub client over WebSocket
//!
//! This crate implements the connection engine and subscription state
//! machines of a wavelink client: it turns a raw WebSocket into a session
//! with identity, reconnection with full-jitter backoff, ping/no-ping health
//! checks, credential refresh, command multiplexing and per-channel
//! recoverable streams.
//!
//! # Core pieces
//!
//! - **Transport**: connect pipeline, read loop, coalesced writes, reply
//!   correlation, reconnect/ping/refresh timers
//! - **Client**: subscription registry, server-side subscription tracking,
//!   reply and push routing, top-level publish/send
//! - **Subscription**: per-channel Unsubscribed/Subscribing/Subscribed state
//!   machine with a stream-offset recovery cursor
//!
//! # Quick start
//!
//! ```rust,no_run
//! use wavelink_client::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> wavelink_core::Result<()> {
//!     let client = Client::new(
//!         "ws://localhost:8000/connection/websocket",
//!         ClientConfig::default().with_token_provider(|| async {
//!             // fetch a fresh JWT from your backend
//!             Ok("jwt".to_string())
//!         }),
//!     );
//!
//!     client.on_connected(|| println!("connected"));
//!     client.on_disconnected(|error| println!("disconnected: {error}"));
//!
//!     let sub = client.new_subscription("news")?;
//!     sub.on_publication(|publication| println!("news: {}", publication.data));
//!     sub.subscribe()?;
//!
//!     client.connect()?;
//!     Ok(())
//! }
//! ```

pub mod backoff;
mod client;
pub mod config;
mod subscription;
pub mod timer;
pub mod transport;
pub mod url;

pub use backoff::ReconnectBackoff;
pub use client::Client;
pub use config::{ClientConfig, TokenProvider, DEFAULT_CLIENT_NAME, MAX_NAME_LEN};
pub use subscription::{Subscription, SubscriptionState};
pub use transport::{ConnectionState, Transport, TransportHooks};
pub use url::{parse_url, UrlComponents};
