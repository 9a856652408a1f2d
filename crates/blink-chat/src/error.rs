//! Error types for chat operations.

use blink_realtime::RealtimeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                ChatError::Unauthenticated
            }
            Some(status) => ChatError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ChatError::Http(err.to_string()),
        }
    }
}

impl From<url::ParseError> for ChatError {
    fn from(err: url::ParseError) -> Self {
        ChatError::Config(err.to_string())
    }
}
