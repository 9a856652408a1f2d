//! Error types for realtime connection operations.

use thiserror::Error;

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors that can occur while talking to the realtime broker.
///
/// The type is `Clone` so that one in-flight handshake outcome can be handed
/// to every caller awaiting the same `connect()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RealtimeError {
    #[error("No valid credential available for the realtime connection")]
    Unauthenticated,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Broker error: {message}")]
    Broker { message: String, details: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame parse error: {0}")]
    FrameParse(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection closed")]
    Closed,

    #[error("Connection attempt aborted")]
    Aborted,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RealtimeError {
    /// Whether the reconnect loop should keep trying after this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RealtimeError::Unauthenticated | RealtimeError::Aborted | RealtimeError::Config(_)
        )
    }

    /// Classify a broker `ERROR` frame received during the handshake.
    pub fn from_broker_frame(message: &str, details: &str) -> Self {
        let lowered = message.to_lowercase();
        let auth_markers = [
            "401",
            "403",
            "unauthorized",
            "unauthenticated",
            "authentication",
            "invalid token",
            "expired",
            "access denied",
        ];
        if auth_markers.iter().any(|m| lowered.contains(m)) {
            RealtimeError::Unauthenticated
        } else {
            RealtimeError::Broker {
                message: message.to_string(),
                details: details.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for RealtimeError {
    fn from(err: url::ParseError) -> Self {
        RealtimeError::Config(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_frames_are_not_retried() {
        let err = RealtimeError::from_broker_frame("Failed to send message: 401 Unauthorized", "");
        assert_eq!(err, RealtimeError::Unauthenticated);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_other_broker_errors_are_retried() {
        let err = RealtimeError::from_broker_frame("Session closed", "buffer overflow");
        assert!(matches!(err, RealtimeError::Broker { .. }));
        assert!(err.is_retryable());
        assert!(RealtimeError::Timeout.is_retryable());
        assert!(RealtimeError::Transport("reset".into()).is_retryable());
    }
}
