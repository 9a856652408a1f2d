//! Older-page fetching and scroll preservation.

use crate::models::HistoryPage;

/// Tracks which history page to fetch next for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginator {
    next_page: Option<u32>,
    in_flight: Option<u32>,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            next_page: Some(0),
            in_flight: None,
        }
    }
}

impl Paginator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_more(&self) -> bool {
        self.next_page.is_some()
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether the top sentinel becoming visible should trigger a fetch.
    pub fn should_fetch(&self, sentinel_visible: bool) -> bool {
        sentinel_visible && self.has_more() && !self.is_fetching()
    }

    /// Claim the next page to fetch. `None` while a fetch is in flight or
    /// when history is exhausted.
    pub fn begin(&mut self) -> Option<u32> {
        if self.in_flight.is_some() {
            return None;
        }
        let page = self.next_page?;
        self.in_flight = Some(page);
        Some(page)
    }

    /// Record a fetched page. The next page follows the index that was
    /// requested, whatever number the server reports.
    pub fn complete(&mut self, page: &HistoryPage) {
        let requested = self.in_flight.take().unwrap_or(page.number);
        self.next_page = page.next_page().map(|_| requested + 1);
    }

    /// The fetch failed; the same page will be requested again.
    pub fn fail(&mut self) {
        self.in_flight = None;
    }
}

/// Scroll position captured before older messages are prepended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportAnchor {
    scroll_height: f64,
    scroll_top: f64,
}

impl ViewportAnchor {
    pub fn capture(scroll_height: f64, scroll_top: f64) -> Self {
        Self {
            scroll_height,
            scroll_top,
        }
    }

    /// Scroll offset that keeps the same content under the viewport once
    /// the container has grown to `new_scroll_height`.
    pub fn restore(&self, new_scroll_height: f64) -> f64 {
        let grown = new_scroll_height - self.scroll_height;
        if grown > 0.0 {
            self.scroll_top + grown
        } else {
            self.scroll_top
        }
    }
}
