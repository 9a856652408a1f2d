//! Heartbeat timeout detection.

use std::time::Duration;

/// Configuration for heartbeat timeout detection.
///
/// The incoming deadline allows 20% drift plus a fixed grace period before
/// a silent connection is considered dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl HeartbeatConfig {
    pub fn new(interval: Duration) -> Self {
        let timeout = interval.mul_f64(1.2) + Duration::from_secs(3);
        Self { interval, timeout }
    }

    /// Watchdog for the negotiated incoming interval, if any.
    pub fn for_incoming(expect_every: Option<Duration>) -> Option<Self> {
        expect_every.map(Self::new)
    }
}
