//! Protocol constants for STOMP 1.2 over WebSocket.
//!
//! # Organization
//!
//! ```text
//! constants/
//! ├── Top-level  - Protocol version, frame terminators, default heartbeats
//! ├── commands   - Frame command names
//! └── headers    - Standard header names
//! ```
//!
//! # Examples
//!
//! ```
//! use blink_realtime::protocol::constants::{commands, headers};
//!
//! assert_eq!(commands::SUBSCRIBE, "SUBSCRIBE");
//! assert_eq!(headers::HEART_BEAT, "heart-beat");
//! ```

// =============================================================================
// Top-Level Constants
// =============================================================================

/// Protocol version offered in `accept-version`.
pub const STOMP_VERSION: &str = "1.2";

/// Frame terminator.
pub const NUL: u8 = 0;

/// A lone end-of-line is a heartbeat.
pub const HEARTBEAT_EOL: &str = "\n";

/// Largest frame the parser will buffer, in bytes.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Default outgoing ping interval offered to the broker, in milliseconds.
pub const DEFAULT_HEARTBEAT_OUTGOING_MS: u64 = 10_000;

/// Default incoming ping interval requested from the broker, in milliseconds.
pub const DEFAULT_HEARTBEAT_INCOMING_MS: u64 = 10_000;

// =============================================================================
// Commands Module
// =============================================================================

/// Frame command names.
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const STOMP: &str = "STOMP";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SEND: &str = "SEND";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const MESSAGE: &str = "MESSAGE";
    pub const RECEIPT: &str = "RECEIPT";
    pub const ERROR: &str = "ERROR";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const ACK: &str = "ACK";
    pub const NACK: &str = "NACK";
    pub const BEGIN: &str = "BEGIN";
    pub const COMMIT: &str = "COMMIT";
    pub const ABORT: &str = "ABORT";
}

// =============================================================================
// Header Names Module
// =============================================================================

/// Standard STOMP header names.
pub mod headers {
    /// Protocol versions the client accepts.
    pub const ACCEPT_VERSION: &str = "accept-version";

    /// Virtual host of the broker.
    pub const HOST: &str = "host";

    /// Heartbeat negotiation: `<outgoing-ms>,<incoming-ms>`.
    pub const HEART_BEAT: &str = "heart-beat";

    /// Bearer credential carried on CONNECT.
    pub const AUTHORIZATION: &str = "Authorization";

    pub const VERSION: &str = "version";
    pub const DESTINATION: &str = "destination";
    pub const ID: &str = "id";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const MESSAGE_ID: &str = "message-id";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const ACK: &str = "ack";

    /// Short error description on ERROR frames.
    pub const MESSAGE: &str = "message";

    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
}

/// Media types used for frame bodies.
pub mod media_types {
    pub const JSON: &str = "application/json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(commands::CONNECT, "CONNECT");
        assert_eq!(commands::MESSAGE, "MESSAGE");
        assert_eq!(commands::ERROR, "ERROR");
    }

    #[test]
    fn test_header_names() {
        assert_eq!(headers::HEART_BEAT, "heart-beat");
        assert_eq!(headers::SUBSCRIPTION, "subscription");
        assert_eq!(headers::CONTENT_LENGTH, "content-length");
    }

    #[test]
    fn test_default_heartbeats() {
        assert_eq!(DEFAULT_HEARTBEAT_OUTGOING_MS, 10_000);
        assert_eq!(DEFAULT_HEARTBEAT_INCOMING_MS, 10_000);
        assert_eq!(MAX_FRAME_BYTES, 1_048_576);
    }
}
