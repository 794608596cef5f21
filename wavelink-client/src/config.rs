//! Client configuration
//!
//! `ClientConfig` is immutable once the client is constructed. Validation
//! happens in `connect`, before any I/O: bad delay bounds or an over-long
//! name/version are configuration errors, never runtime ones.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use wavelink_core::{Error, Result};

/// Longest accepted client name/version, in bytes.
pub const MAX_NAME_LEN: usize = 16;

/// Upper bound for the minimum reconnect delay.
pub const MAX_MIN_RECONNECT_DELAY: Duration = Duration::from_millis(0xFFFF);

/// Fallback client name sent in the connect request when none is configured.
pub const DEFAULT_CLIENT_NAME: &str = "rust";

/// Fallible token source invoked whenever a fresh JWT is needed: on first
/// connect without a static token, after the server reports an expired
/// token, and when the refresh timer fires.
pub type TokenProvider =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;

/// Configuration for a [`Client`](crate::Client).
///
/// ```
/// use std::time::Duration;
/// use wavelink_client::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_token("jwt")
///     .with_name("billing-worker")
///     .with_reconnect_delays(Duration::from_millis(100), Duration::from_secs(10));
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Static connection token. When empty, `get_token` supplies one.
    pub token: String,
    /// Token source for initial connects, refresh and expiry recovery.
    pub get_token: Option<TokenProvider>,
    /// Client name reported to the server (at most 16 bytes).
    pub name: String,
    /// Client version reported to the server (at most 16 bytes).
    pub version: String,
    /// Grace added to the server-announced ping interval before the
    /// connection is declared dead.
    pub max_ping_delay: Duration,
    /// Lower bound of the reconnect backoff (at most 65535 ms).
    pub min_reconnect_delay: Duration,
    /// Upper bound of the reconnect backoff.
    pub max_reconnect_delay: Duration,
    /// Lead time before token expiry at which a refresh is issued.
    pub refresh_before_expiry: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            get_token: None,
            name: String::new(),
            version: String::new(),
            max_ping_delay: Duration::from_secs(10),
            min_reconnect_delay: Duration::from_millis(200),
            max_reconnect_delay: Duration::from_secs(20),
            refresh_before_expiry: Duration::from_secs(180),
        }
    }
}

impl ClientConfig {
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the token source. The provider is an async closure returning a
    /// fresh token or an error; a failure moves the client to Disconnected
    /// with an unauthorized error.
    pub fn with_token_provider<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.get_token = Some(Arc::new(move || Box::pin(provider())));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_max_ping_delay(mut self, delay: Duration) -> Self {
        self.max_ping_delay = delay;
        self
    }

    pub fn with_reconnect_delays(mut self, min: Duration, max: Duration) -> Self {
        self.min_reconnect_delay = min;
        self.max_reconnect_delay = max;
        self
    }

    pub fn with_refresh_before_expiry(mut self, lead: Duration) -> Self {
        self.refresh_before_expiry = lead;
        self
    }

    /// Validate the configuration bounds. Called by `connect` before any
    /// I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.min_reconnect_delay >= self.max_reconnect_delay {
            return Err(Error::Config(
                "max_reconnect_delay must be greater than min_reconnect_delay".into(),
            ));
        }
        if self.min_reconnect_delay > MAX_MIN_RECONNECT_DELAY {
            return Err(Error::Config(
                "min_reconnect_delay cannot exceed 65535 ms".into(),
            ));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(Error::Config(
                "name cannot be longer than 16 bytes".into(),
            ));
        }
        if self.version.len() > MAX_NAME_LEN {
            return Err(Error::Config(
                "version cannot be longer than 16 bytes".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &(!self.token.is_empty()))
            .field("get_token", &self.get_token.is_some())
            .field("name", &self.name)
            .field("version", &self.version)
            .field("max_ping_delay", &self.max_ping_delay)
            .field("min_reconnect_delay", &self.min_reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("refresh_before_expiry", &self.refresh_before_expiry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_delays() {
        let config = ClientConfig::default()
            .with_reconnect_delays(Duration::from_secs(5), Duration::from_secs(1));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_oversized_min_delay() {
        let config = ClientConfig::default()
            .with_reconnect_delays(Duration::from_millis(70_000), Duration::from_millis(80_000));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_long_name_and_version() {
        let config = ClientConfig::default().with_name("a-name-that-is-way-too-long");
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_version("1.0.0-build.12345678");
        assert!(config.validate().is_err());
    }

    #[test]
    fn token_provider_is_invocable() {
        let config =
            ClientConfig::default().with_token_provider(|| async { Ok("fresh".to_string()) });
        let provider = config.get_token.expect("provider set");
        let token = futures_util::future::FutureExt::now_or_never(provider())
            .expect("ready future")
            .unwrap();
        assert_eq!(token, "fresh");
    }
}
