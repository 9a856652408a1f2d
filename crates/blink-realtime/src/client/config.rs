//! Configuration for the realtime connection.

use crate::client::retry::RetryConfig;
use crate::error::{RealtimeError, Result};
use crate::types::Heartbeat;
use std::time::Duration;
use url::Url;

/// Configuration for one realtime connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Broker endpoint. `http(s)` schemes are rewritten to `ws(s)`.
    pub url: String,
    /// Value of the CONNECT `host` header. Defaults to the URL host.
    pub host: Option<String>,
    /// Heartbeat offer sent on CONNECT.
    pub heartbeat: Heartbeat,
    /// Time allowed between opening the socket and receiving CONNECTED.
    pub handshake_timeout: Duration,
    /// Reconnect backoff.
    pub retry: RetryConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            url: "ws://localhost:8080/ws".to_string(),
            host: None,
            heartbeat: Heartbeat::new(
                crate::protocol::DEFAULT_HEARTBEAT_OUTGOING_MS,
                crate::protocol::DEFAULT_HEARTBEAT_INCOMING_MS,
            ),
            handshake_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The socket URL with the scheme normalized to `ws`/`wss`.
    pub fn socket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(RealtimeError::Config(format!(
                    "Unsupported scheme: {}",
                    other
                )))
            }
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|_| RealtimeError::Config(format!("Cannot use scheme {}", scheme)))?;
        }
        Ok(url)
    }

    /// Host advertised in the CONNECT frame.
    pub fn connect_host(&self) -> String {
        if let Some(host) = &self.host {
            return host.clone();
        }
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}
