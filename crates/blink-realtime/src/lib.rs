//! STOMP-over-WebSocket client with automatic reconnection.
//!
//! [`ConnectionManager`] keeps one logical connection to the broker, retries
//! unintentional losses with exponential backoff and re-subscribes every
//! registered topic after each reconnect.

pub mod client;
pub mod error;
pub mod protocol;
#[cfg(feature = "test-util")]
pub mod testing;
pub mod traits;
pub mod types;

pub use client::{
    ConnectionConfig, ConnectionManager, ConnectionStatus, RetryConfig, Subscription, WsConnector,
};
pub use error::{RealtimeError, Result};
pub use traits::{Connector, CredentialSource, StaticToken, Transport, TransportEvent};
pub use types::{Command, Frame, Heartbeat};
