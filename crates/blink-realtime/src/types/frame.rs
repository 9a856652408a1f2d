//! A single STOMP frame.

use crate::error::{RealtimeError, Result};
use crate::protocol::constants::{commands, headers, media_types, STOMP_VERSION};
use crate::types::Heartbeat;
use std::fmt;
use std::str::FromStr;

/// Frame command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => commands::CONNECT,
            Command::Stomp => commands::STOMP,
            Command::Connected => commands::CONNECTED,
            Command::Send => commands::SEND,
            Command::Subscribe => commands::SUBSCRIBE,
            Command::Unsubscribe => commands::UNSUBSCRIBE,
            Command::Message => commands::MESSAGE,
            Command::Receipt => commands::RECEIPT,
            Command::Error => commands::ERROR,
            Command::Disconnect => commands::DISCONNECT,
            Command::Ack => commands::ACK,
            Command::Nack => commands::NACK,
            Command::Begin => commands::BEGIN,
            Command::Commit => commands::COMMIT,
            Command::Abort => commands::ABORT,
        }
    }

    /// Header values on these frames are sent verbatim (STOMP 1.2 §Value Encoding).
    pub fn skips_header_escaping(&self) -> bool {
        matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self> {
        let command = match s {
            commands::CONNECT => Command::Connect,
            commands::STOMP => Command::Stomp,
            commands::CONNECTED => Command::Connected,
            commands::SEND => Command::Send,
            commands::SUBSCRIBE => Command::Subscribe,
            commands::UNSUBSCRIBE => Command::Unsubscribe,
            commands::MESSAGE => Command::Message,
            commands::RECEIPT => Command::Receipt,
            commands::ERROR => Command::Error,
            commands::DISCONNECT => Command::Disconnect,
            commands::ACK => Command::Ack,
            commands::NACK => Command::Nack,
            commands::BEGIN => Command::Begin,
            commands::COMMIT => Command::Commit,
            commands::ABORT => Command::Abort,
            other => {
                return Err(RealtimeError::FrameParse(format!(
                    "Unknown command: {}",
                    other
                )))
            }
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete STOMP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Lookups return the first occurrence.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Frame {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame carrying the bearer credential and heartbeat offer.
    #[must_use]
    pub fn connect(host: &str, heartbeat: Heartbeat, token: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header(headers::ACCEPT_VERSION, STOMP_VERSION)
            .with_header(headers::HOST, host)
            .with_header(headers::HEART_BEAT, heartbeat.to_string())
            .with_header(headers::AUTHORIZATION, format!("Bearer {}", token))
    }

    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header(headers::ID, id)
            .with_header(headers::DESTINATION, destination)
            .with_header(headers::ACK, "auto")
    }

    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header(headers::ID, id)
    }

    /// SEND frame with a JSON body.
    #[must_use]
    pub fn send_json(destination: &str, body: &serde_json::Value) -> Self {
        Frame::new(Command::Send)
            .with_header(headers::DESTINATION, destination)
            .with_header(headers::CONTENT_TYPE, media_types::JSON)
            .with_body(body.to_string())
    }

    #[must_use]
    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Negotiated heartbeat advertised on a CONNECT/CONNECTED frame.
    pub fn heartbeat(&self) -> Heartbeat {
        self.header(headers::HEART_BEAT)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trip_names() {
        assert_eq!("MESSAGE".parse::<Command>().unwrap(), Command::Message);
        assert_eq!(Command::Subscribe.as_str(), "SUBSCRIBE");
        assert!("PING".parse::<Command>().is_err());
    }

    #[test]
    fn test_connect_frame_headers() {
        let frame = Frame::connect("chat.local", Heartbeat::new(10_000, 10_000), "tok");
        assert_eq!(frame.header("accept-version"), Some("1.2"));
        assert_eq!(frame.header("heart-beat"), Some("10000,10000"));
        assert_eq!(frame.header("Authorization"), Some("Bearer tok"));
    }

    #[test]
    fn test_first_header_wins() {
        let frame = Frame::new(Command::Message)
            .with_header("destination", "/a")
            .with_header("destination", "/b");
        assert_eq!(frame.header("destination"), Some("/a"));
    }
}
