//! Shared header value escaping for STOMP 1.2.

use crate::error::{RealtimeError, Result};

/// Escape a header name or value for transmission.
pub fn escape_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape_header_value`]. Undefined escape sequences are a protocol error.
pub fn unescape_header_value(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(RealtimeError::FrameParse(format!(
                    "Invalid escape sequence \\{} in header '{}'",
                    other.map(String::from).unwrap_or_default(),
                    value
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_special_characters() {
        assert_eq!(escape_header_value("a:b\nc\\"), "a\\cb\\nc\\\\");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape_header_value("a\\cb\\nc\\\\").unwrap(), "a:b\nc\\");
        assert!(unescape_header_value("bad\\t").is_err());
    }
}
