//! Frame parser for STOMP streams.
//!
//! WebSocket brokers usually send one frame per text message, but nothing
//! in the protocol guarantees it, so the parser buffers partial input and
//! yields every complete frame and heartbeat it can find.

use crate::error::{RealtimeError, Result};
use crate::protocol::constants::{headers, MAX_FRAME_BYTES, NUL};
use crate::protocol::unescape_header_value;
use crate::types::{Command, Frame};

/// Something read off the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Heartbeat,
    Frame(Frame),
}

#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append input and drain every complete item.
    ///
    /// On error the buffer is discarded so one malformed frame cannot wedge
    /// the stream.
    pub fn feed(&mut self, data: &str) -> Result<Vec<Inbound>> {
        self.buffer.extend_from_slice(data.as_bytes());
        let mut out = Vec::new();

        loop {
            match self.buffer.first() {
                None => break,
                Some(b'\n') => {
                    self.buffer.drain(..1);
                    out.push(Inbound::Heartbeat);
                    continue;
                }
                Some(b'\r') if self.buffer.get(1) == Some(&b'\n') => {
                    self.buffer.drain(..2);
                    out.push(Inbound::Heartbeat);
                    continue;
                }
                Some(_) => {}
            }

            match parse_frame(&self.buffer) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.drain(..consumed);
                    out.push(Inbound::Frame(frame));
                }
                Ok(None) if self.buffer.len() > MAX_FRAME_BYTES => {
                    self.buffer.clear();
                    return Err(RealtimeError::FrameParse(format!(
                        "Frame exceeds {} bytes",
                        MAX_FRAME_BYTES
                    )));
                }
                Ok(None) => break,
                Err(e) => {
                    self.buffer.clear();
                    return Err(e);
                }
            }
        }

        Ok(out)
    }

    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Parse a single complete frame from text.
pub fn parse_frame_str(text: &str) -> Result<Frame> {
    match parse_frame(text.as_bytes())? {
        Some((frame, _)) => Ok(frame),
        None => Err(RealtimeError::FrameParse(
            "Frame missing NUL terminator".to_string(),
        )),
    }
}

/// Returns the frame and the number of bytes consumed, or `None` if the
/// input does not yet hold a complete frame.
fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
    let mut pos = 0;

    let Some(command_line) = read_line(buf, &mut pos) else {
        return Ok(None);
    };
    let command: Command = utf8(command_line)?.parse()?;
    let escaped = !command.skips_header_escaping();

    let mut frame = Frame::new(command);
    loop {
        let Some(line) = read_line(buf, &mut pos) else {
            return Ok(None);
        };
        if line.is_empty() {
            break;
        }
        let line = utf8(line)?;
        let (name, value) = line.split_once(':').ok_or_else(|| {
            RealtimeError::FrameParse(format!("Malformed header line: {}", line))
        })?;
        let (name, value) = if escaped {
            (unescape_header_value(name)?, unescape_header_value(value)?)
        } else {
            (name.to_string(), value.to_string())
        };
        frame.headers.push((name, value));
    }

    let content_length = frame
        .header(headers::CONTENT_LENGTH)
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| RealtimeError::FrameParse(format!("Invalid content-length: {}", v)))
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            let end = pos
                .checked_add(len)
                .filter(|end| *end <= MAX_FRAME_BYTES)
                .ok_or_else(|| {
                    RealtimeError::FrameParse(format!("content-length too large: {}", len))
                })?;
            if buf.len() <= end {
                return Ok(None);
            }
            if buf[end] != NUL {
                return Err(RealtimeError::FrameParse(
                    "Body longer than content-length".to_string(),
                ));
            }
            end
        }
        None => match buf[pos..].iter().position(|b| *b == NUL) {
            Some(offset) => pos + offset,
            None => return Ok(None),
        },
    };

    frame.body = utf8(&buf[pos..body_end])?.to_string();
    Ok(Some((frame, body_end + 1)))
}

/// Read up to the next `\n`, stripping an optional trailing `\r`.
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let rest = &buf[*pos..];
    let end = rest.iter().position(|b| *b == b'\n')?;
    *pos += end + 1;
    let line = &rest[..end];
    Some(line.strip_suffix(b"\r").unwrap_or(line))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| RealtimeError::FrameParse(e.to_string()))
}
