//! Heart-beat header value.

use crate::error::{RealtimeError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// `heart-beat` header: `<outgoing-ms>,<incoming-ms>`. Zero means "none".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Heartbeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl Heartbeat {
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    /// Combine the client offer with the server's CONNECTED reply.
    ///
    /// Returns `(send_every, expect_every)`; `None` disables that direction.
    pub fn negotiate(client: Heartbeat, server: Heartbeat) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: u64, theirs: u64| {
            if ours == 0 || theirs == 0 {
                None
            } else {
                Some(Duration::from_millis(ours.max(theirs)))
            }
        };
        (
            pick(client.outgoing_ms, server.incoming_ms),
            pick(client.incoming_ms, server.outgoing_ms),
        )
    }
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing_ms, self.incoming_ms)
    }
}

impl FromStr for Heartbeat {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self> {
        let (out, inc) = s
            .split_once(',')
            .ok_or_else(|| RealtimeError::FrameParse(format!("Invalid heart-beat: {}", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| RealtimeError::FrameParse(format!("Invalid heart-beat: {}", s)))
        };
        Ok(Heartbeat::new(parse(out)?, parse(inc)?))
    }
}
