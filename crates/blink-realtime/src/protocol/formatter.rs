//! Protocol frame formatter.
//!
//! Converts `Frame` values into STOMP wire text ready for a WebSocket
//! text message.

use crate::protocol::constants::headers;
use crate::protocol::escape_header_value;
use crate::types::Frame;

/// Format a frame into STOMP wire text.
///
/// A `content-length` header is added for non-empty bodies unless the
/// caller already supplied one. The result always ends with the NUL
/// terminator.
pub fn format_frame(frame: &Frame) -> String {
    let escape = !frame.command.skips_header_escaping();
    let mut buffer = String::with_capacity(64 + frame.body.len());

    buffer.push_str(frame.command.as_str());
    buffer.push('\n');

    for (k, v) in &frame.headers {
        if escape {
            write_header(&mut buffer, &escape_header_value(k), &escape_header_value(v));
        } else {
            write_header(&mut buffer, k, v);
        }
    }

    if !frame.body.is_empty() && frame.header(headers::CONTENT_LENGTH).is_none() {
        write_header(
            &mut buffer,
            headers::CONTENT_LENGTH,
            &frame.body.len().to_string(),
        );
    }

    buffer.push('\n'); // End of headers
    buffer.push_str(&frame.body);
    buffer.push('\0');
    buffer
}

fn write_header(buffer: &mut String, key: &str, value: &str) {
    buffer.push_str(key);
    buffer.push(':');
    buffer.push_str(value);
    buffer.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Command, Frame};

    #[test]
    fn test_format_send() {
        let frame = Frame::send_json("/app/chat.sendMessage", &serde_json::json!({"body": "hi"}));
        let s = format_frame(&frame);

        assert!(s.starts_with("SEND\n"));
        assert!(s.contains("destination:/app/chat.sendMessage\n"));
        assert!(s.contains("content-length:13\n"));
        assert!(s.ends_with("\n\n{\"body\":\"hi\"}\0"));
    }

    #[test]
    fn test_format_escapes_except_on_connect() {
        let msg = Frame::new(Command::Subscribe).with_header("id", "a:b");
        assert!(format_frame(&msg).contains("id:a\\cb\n"));

        let connect = Frame::new(Command::Connect).with_header("host", "a:b");
        assert!(format_frame(&connect).contains("host:a:b\n"));
    }

    #[test]
    fn test_format_empty_body() {
        let s = format_frame(&Frame::disconnect());
        assert_eq!(s, "DISCONNECT\n\n\0");
    }
}
