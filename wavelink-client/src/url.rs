//! Endpoint URL parsing
//!
//! Accepts `ws://host[:port][/path]` and `wss://host[:port][/path]`. The
//! port defaults to 80 or 443 by scheme and the path to `/`. Anything else
//! is a configuration error.

use wavelink_core::{Error, Result};

/// Parsed endpoint components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlComponents {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub secure: bool,
}

impl UrlComponents {
    /// Rebuild the endpoint string handed to the WebSocket connector.
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

/// Parse an endpoint URL into its components.
pub fn parse_url(url: &str) -> Result<UrlComponents> {
    let (rest, secure) = if let Some(rest) = url.strip_prefix("wss://") {
        (rest, true)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        (rest, false)
    } else {
        return Err(Error::Config(
            "URL must start with ws:// or wss://".into(),
        ));
    };

    let (authority, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], rest[slash..].to_string()),
        None => (rest, "/".to_string()),
    };

    let (host, port) = match authority.find(':') {
        Some(colon) => {
            let host = &authority[..colon];
            let port = authority[colon + 1..]
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid port in URL: {url}")))?;
            (host, port)
        }
        None => (authority, if secure { 443 } else { 80 }),
    };

    if host.is_empty() {
        return Err(Error::Config("host cannot be empty".into()));
    }

    Ok(UrlComponents {
        host: host.to_string(),
        port,
        path,
        secure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(host: &str, port: u16, path: &str, secure: bool) -> UrlComponents {
        UrlComponents {
            host: host.into(),
            port,
            path: path.into(),
            secure,
        }
    }

    #[test]
    fn parse_table() {
        let cases = [
            ("ws://h", components("h", 80, "/", false)),
            ("ws://h/p", components("h", 80, "/p", false)),
            ("ws://h:1234", components("h", 1234, "/", false)),
            ("ws://h:1234/p", components("h", 1234, "/p", false)),
            ("wss://h/p", components("h", 443, "/p", true)),
            ("wss://h", components("h", 443, "/", true)),
            (
                "ws://example.com:8000/connection/websocket",
                components("example.com", 8000, "/connection/websocket", false),
            ),
        ];
        for (url, expected) in cases {
            assert_eq!(parse_url(url).unwrap(), expected, "url: {url}");
        }
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(parse_url("http://h").is_err());
        assert!(parse_url("h:1234").is_err());
        assert!(parse_url("ws://").is_err());
        assert!(parse_url("ws://:8080/p").is_err());
        assert!(parse_url("ws://h:notaport").is_err());
        assert!(parse_url("ws://h:99999").is_err());
    }

    #[test]
    fn endpoint_round_trip() {
        let parsed = parse_url("wss://example.com/connection/websocket").unwrap();
        assert_eq!(
            parsed.endpoint(),
            "wss://example.com:443/connection/websocket"
        );
    }
}
