//! Wavelink - realtime pub/sub over WebSocket
//!
//! This is the convenience crate that re-exports the wavelink sub-crates.
//! Depend on it when you want a single dependency for the client and the
//! wire protocol types.
//!
//! - **wavelink-core**: wire protocol types, codec, error taxonomy
//! - **wavelink-client**: WebSocket client with reconnection, recovery and
//!   token refresh
//!
//! # Quick start
//!
//! ```rust,no_run
//! use wavelink::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> wavelink::core::Result<()> {
//!     let client = Client::new(
//!         "ws://localhost:8000/connection/websocket",
//!         ClientConfig::default().with_token("jwt"),
//!     );
//!
//!     let sub = client.new_subscription("news")?;
//!     sub.on_publication(|publication| println!("news: {}", publication.data));
//!     sub.subscribe()?;
//!
//!     client.connect()?;
//!     Ok(())
//! }
//! ```

pub use wavelink_client as client;
pub use wavelink_core as core;

pub use wavelink_client::{
    Client, ClientConfig, ConnectionState, Subscription, SubscriptionState,
};
pub use wavelink_core::{Error, Result};
