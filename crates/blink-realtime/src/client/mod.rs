//! Realtime connection client.

mod config;
mod heartbeat;
mod manager;
pub mod native_network;
mod registry;
pub mod retry;
mod status;
mod subscription;

pub use config::ConnectionConfig;
pub use heartbeat::HeartbeatConfig;
pub use manager::ConnectionManager;
pub use native_network::WsConnector;
pub use registry::MessageCallback;
pub use retry::{RetryConfig, RetryDecision, RetryState};
pub use status::ConnectionStatus;
pub use subscription::Subscription;
