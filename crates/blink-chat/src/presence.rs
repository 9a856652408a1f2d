//! Online status of other users, pushed on the presence topic.

use crate::topics;
use blink_realtime::{ConnectionManager, Subscription};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Broadcast when a user's last socket connects or disconnects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub user_id: String,
    #[serde(default)]
    pub online: bool,
}

/// Last known status per user.
#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    users: BTreeMap<String, bool>,
}

impl PresenceMap {
    /// Returns whether the recorded status changed. Events without a user
    /// id are ignored.
    pub fn apply(&mut self, event: PresenceEvent) -> bool {
        if event.user_id.trim().is_empty() {
            return false;
        }
        self.users.insert(event.user_id, event.online) != Some(event.online)
    }

    /// `None` until an event for `user_id` has been seen.
    pub fn is_online(&self, user_id: &str) -> Option<bool> {
        self.users.get(user_id).copied()
    }

    pub fn online_users(&self) -> Vec<String> {
        self.users
            .iter()
            .filter(|(_, online)| **online)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Follows the presence topic for as long as it is alive.
pub struct PresenceTracker {
    map: Arc<Mutex<PresenceMap>>,
    revision: watch::Receiver<u64>,
    _subscription: Subscription,
}

impl PresenceTracker {
    pub fn start(manager: &ConnectionManager) -> Self {
        let map = Arc::new(Mutex::new(PresenceMap::default()));
        let (tx, revision) = watch::channel(0u64);
        let subscription = manager.subscribe(topics::PRESENCE, {
            let map = map.clone();
            move |payload| match serde_json::from_value::<PresenceEvent>(payload) {
                Ok(event) => {
                    let user = event.user_id.clone();
                    let online = event.online;
                    if map.lock().apply(event) {
                        debug!("[Presence] {} online={}", user, online);
                        tx.send_modify(|r| *r += 1);
                    }
                }
                Err(e) => warn!("[Presence] Dropping event: {}", e),
            }
        });
        Self {
            map,
            revision,
            _subscription: subscription,
        }
    }

    pub fn is_online(&self, user_id: &str) -> Option<bool> {
        self.map.lock().is_online(user_id)
    }

    pub fn online_users(&self) -> Vec<String> {
        self.map.lock().online_users()
    }

    /// Bumped whenever a user's status changes.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.clone()
    }
}
