//! Topic registrations that outlive individual connections.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Handler invoked for every payload delivered to a registration.
pub type MessageCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

const HANDLE_PREFIX: &str = "sub-";

struct Entry {
    destination: String,
    callback: MessageCallback,
    live: bool,
}

/// Registrations keyed by id. Topics are not unique: two registrations on
/// the same destination are tracked and released independently.
#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
}

impl Registry {
    pub fn insert(&mut self, destination: String, callback: MessageCallback) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(
            id,
            Entry {
                destination,
                callback,
                live: false,
            },
        );
        id
    }

    /// Remove a registration, returning whether it held a live handle.
    pub fn remove(&mut self, id: u64) -> Option<bool> {
        self.entries.remove(&id).map(|e| e.live)
    }

    pub fn mark_live(&mut self, id: u64) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.live = true;
        }
    }

    pub fn clear_live(&mut self) {
        for entry in self.entries.values_mut() {
            entry.live = false;
        }
    }

    /// Every registration as `(id, destination)` in registration order.
    pub fn targets(&self) -> Vec<(u64, String)> {
        self.entries
            .iter()
            .map(|(id, e)| (*id, e.destination.clone()))
            .collect()
    }

    pub fn callback_for(&self, handle: &str) -> Option<MessageCallback> {
        let id = parse_handle(handle)?;
        self.entries.get(&id).map(|e| e.callback.clone())
    }

    pub fn live_handles(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.live)
            .map(|(id, e)| (handle_for(*id), e.destination.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Broker-side subscription id for a registration.
pub fn handle_for(id: u64) -> String {
    format!("{}{}", HANDLE_PREFIX, id)
}

fn parse_handle(handle: &str) -> Option<u64> {
    handle.strip_prefix(HANDLE_PREFIX)?.parse().ok()
}
