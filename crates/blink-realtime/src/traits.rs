use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

/// Event delivered by an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text message (may hold several frames or heartbeats).
    Text(String),
    /// The transport is gone. No further events follow.
    Closed { code: Option<u16>, reason: String },
}

/// One open, bidirectional text transport.
///
/// Closing `outgoing` asks the transport to shut down.
pub struct Transport {
    pub outgoing: async_channel::Sender<String>,
    pub incoming: async_channel::Receiver<TransportEvent>,
}

/// Abstraction for opening the underlying socket.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Transport>;
}

/// Abstraction for the persisted credential read before each connect.
#[async_trait]
pub trait CredentialSource: Send + Sync + 'static {
    async fn access_token(&self) -> Option<String>;
}

/// In-memory credential, replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: RwLock<Option<String>>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

#[async_trait]
impl CredentialSource for StaticToken {
    async fn access_token(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .filter(|t| !t.trim().is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_blank_counts_as_missing() {
        let creds = StaticToken::new("  ");
        assert_eq!(creds.access_token().await, None);
        creds.set("abc");
        assert_eq!(creds.access_token().await.as_deref(), Some("abc"));
        creds.clear();
        assert_eq!(creds.access_token().await, None);
    }
}
