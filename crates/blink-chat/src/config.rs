use chrono::Duration;

/// How a new message reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendRoute {
    /// Publish on the realtime connection.
    #[default]
    Socket,
    /// POST to the send-message endpoint.
    Rest,
}

/// Chat-side tunables.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Messages per history page.
    pub page_size: u32,
    /// Max distance between an optimistic message and its confirmation.
    pub match_window: Duration,
    /// Optimistic messages older than this are purged.
    pub retention: Duration,
    pub cleanup_interval: std::time::Duration,
    pub send_route: SendRoute,
    /// Resend undispatched outbox records after every successful connect.
    pub replay_outbox: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            match_window: Duration::milliseconds(300_000),
            retention: Duration::hours(24),
            cleanup_interval: std::time::Duration::from_secs(3600),
            send_route: SendRoute::Socket,
            replay_outbox: true,
        }
    }
}

impl ChatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_match_window(mut self, window: Duration) -> Self {
        self.match_window = window;
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: std::time::Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    #[must_use]
    pub fn with_send_route(mut self, route: SendRoute) -> Self {
        self.send_route = route;
        self
    }

    #[must_use]
    pub fn with_replay_outbox(mut self, replay: bool) -> Self {
        self.replay_outbox = replay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.match_window.num_milliseconds(), 300_000);
        assert_eq!(config.retention.num_hours(), 24);
        assert_eq!(config.send_route, SendRoute::Socket);
        assert!(config.replay_outbox);
    }

    #[test]
    fn test_page_size_never_zero() {
        assert_eq!(ChatConfig::new().with_page_size(0).page_size, 1);
    }
}
