//! Merging history, live and optimistic messages into one timeline.

use crate::identity::Identity;
use crate::models::{is_confirmed_id, HistoryPage, Message};
use chrono::Duration;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Where a rendered entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    History,
    Live,
    Optimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub message: Message,
    pub provenance: Provenance,
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Merge {
    pub entries: Vec<Entry>,
    /// Optimistic ids superseded by a confirmed message in this pass.
    pub retired: Vec<String>,
}

/// Confirmed messages of one conversation.
#[derive(Debug, Clone)]
pub struct Timeline {
    conversation_id: String,
    identity: Identity,
    match_window: Duration,
    pages: BTreeMap<u32, Vec<Message>>,
    live: Vec<Message>,
    /// Confirmed ids that already retired an optimistic entry.
    claimed: HashSet<String>,
}

impl Timeline {
    pub fn new(conversation_id: impl Into<String>, identity: Identity, match_window: Duration) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            identity,
            match_window,
            pages: BTreeMap::new(),
            live: Vec::new(),
            claimed: HashSet::new(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Store a history page. Re-fetching a page replaces it.
    pub fn apply_page(&mut self, page: HistoryPage) {
        let messages = page
            .messages
            .into_iter()
            .filter(|m| m.conversation_id == self.conversation_id)
            .collect();
        self.pages.insert(page.number, messages);
    }

    /// Record a pushed message. Messages for other conversations are ignored.
    pub fn push_live(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }
        self.live.push(message);
        true
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Confirmed messages keyed by id. Pages apply in index order, then live
    /// messages in arrival order; a later write for the same id wins.
    fn confirmed(&self) -> HashMap<String, Entry> {
        let mut by_id = HashMap::new();
        let history = self
            .pages
            .values()
            .flatten()
            .map(|m| (m, Provenance::History));
        let live = self.live.iter().map(|m| (m, Provenance::Live));
        for (message, provenance) in history.chain(live) {
            by_id.insert(
                message.id.clone(),
                Entry {
                    message: message.clone(),
                    provenance,
                },
            );
        }
        by_id
    }

    fn equivalent(&self, optimistic: &Message, confirmed: &Message) -> bool {
        optimistic.conversation_id == confirmed.conversation_id
            && self.identity.resolve(&optimistic.sender_id) == self.identity.resolve(&confirmed.sender_id)
            && optimistic.body.trim() == confirmed.body.trim()
            && (optimistic.created_at - confirmed.created_at).abs() <= self.match_window
    }

    /// Produce the ordered, deduplicated sequence.
    ///
    /// Each confirmed message retires at most one optimistic entry: the
    /// equivalent one closest to it in time. Deleted messages take part in
    /// dedup and matching but are not rendered.
    pub fn merge(&mut self, optimistic: &[Message]) -> Merge {
        let confirmed = self.confirmed();

        let mut by_time: Vec<&Entry> = confirmed.values().collect();
        by_time.sort_by(|a, b| {
            a.message
                .created_at
                .cmp(&b.message.created_at)
                .then_with(|| a.message.id.cmp(&b.message.id))
        });

        let mut open: Vec<&Message> = optimistic
            .iter()
            .filter(|m| m.conversation_id == self.conversation_id && !confirmed.contains_key(&m.id))
            .collect();
        let mut retired = Vec::new();

        for entry in by_time {
            if open.is_empty() {
                break;
            }
            if self.claimed.contains(&entry.message.id) {
                continue;
            }
            let best = open
                .iter()
                .enumerate()
                .filter(|(_, o)| self.equivalent(o, &entry.message))
                .min_by_key(|(_, o)| ((o.created_at - entry.message.created_at).abs(), o.created_at))
                .map(|(index, _)| index);
            if let Some(index) = best {
                let matched = open.remove(index);
                tracing::debug!(
                    "[Reconcile] {} confirmed by {}",
                    matched.id,
                    entry.message.id
                );
                retired.push(matched.id.clone());
                self.claimed.insert(entry.message.id.clone());
            }
        }

        let mut entries: Vec<Entry> = confirmed
            .into_values()
            .filter(|e| !e.message.deleted)
            .collect();
        entries.extend(open.into_iter().map(|m| Entry {
            message: m.clone(),
            provenance: Provenance::Optimistic,
        }));

        Merge {
            entries: order(entries),
            retired,
        }
    }
}

/// Entries with confirmed-shape ids keep id order; the rest are slotted in
/// by timestamp.
fn order(entries: Vec<Entry>) -> Vec<Entry> {
    let (mut by_id, mut by_time): (Vec<Entry>, Vec<Entry>) = entries
        .into_iter()
        .partition(|e| is_confirmed_id(&e.message.id));
    by_id.sort_by(|a, b| a.message.id.cmp(&b.message.id));
    by_time.sort_by(|a, b| {
        a.message
            .created_at
            .cmp(&b.message.created_at)
            .then_with(|| a.message.id.cmp(&b.message.id))
    });

    let mut out = Vec::with_capacity(by_id.len() + by_time.len());
    let mut ids = by_id.into_iter().peekable();
    let mut times = by_time.into_iter().peekable();
    loop {
        let take_time = match (ids.peek(), times.peek()) {
            (Some(a), Some(b)) => b.message.created_at < a.message.created_at,
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (None, None) => break,
        };
        let next = if take_time { times.next() } else { ids.next() };
        out.extend(next);
    }
    out
}
