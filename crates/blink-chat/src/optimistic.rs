//! Locally created messages awaiting confirmation, plus their outbox.
//!
//! This is the only chat state that survives a restart. It is persisted as
//! one JSON document, written to a temp file and renamed into place.

use crate::error::Result;
use crate::models::Message;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Namespace key of the persisted store.
pub const STORE_KEY: &str = "blink.optimistic.v1";

/// Transport instructions recorded for an optimistic message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    pub destination: String,
    pub payload: serde_json::Value,
    /// Handed to a transport at least once.
    #[serde(default)]
    pub dispatched: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    messages: BTreeMap<String, Message>,
    #[serde(default)]
    outbox: BTreeMap<String, OutboxRecord>,
    /// Records a sender currently holds. Not persisted: after a restart
    /// nothing is in flight.
    #[serde(skip)]
    in_flight: BTreeSet<String>,
}

impl Snapshot {
    fn remove(&mut self, temp_id: &str) -> bool {
        self.in_flight.remove(temp_id);
        let had_message = self.messages.remove(temp_id).is_some();
        let had_record = self.outbox.remove(temp_id).is_some();
        had_message || had_record
    }
}

/// Shared store of optimistic messages.
pub struct OptimisticStore {
    path: Option<PathBuf>,
    state: RwLock<Snapshot>,
    revision: watch::Sender<u64>,
}

impl OptimisticStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::with_snapshot(None, Snapshot::default())
    }

    /// File name of the store inside a state directory.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", STORE_KEY))
    }

    /// Restore the store from `path`. A missing file is an empty store; an
    /// unreadable one is logged and replaced.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let snapshot = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Snapshot>(&content) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("[Outbox] Discarding unreadable store {:?}: {}", path, e);
                    Snapshot::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "[Outbox] Restored {} optimistic message(s), {} outbox record(s)",
            snapshot.messages.len(),
            snapshot.outbox.len()
        );
        Ok(Self::with_snapshot(Some(path), snapshot))
    }

    fn with_snapshot(path: Option<PathBuf>, snapshot: Snapshot) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            path,
            state: RwLock::new(snapshot),
            revision,
        }
    }

    /// Bumped after every change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Record a provisional message, and its transport instructions when
    /// given.
    pub async fn add_optimistic(
        &self,
        message: Message,
        outbox: Option<(String, serde_json::Value)>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let temp_id = message.id.clone();
        if let Some((destination, payload)) = outbox {
            state.outbox.insert(
                temp_id.clone(),
                OutboxRecord {
                    destination,
                    payload,
                    dispatched: false,
                    recorded_at: Utc::now(),
                },
            );
        }
        state.messages.insert(temp_id.clone(), message);
        self.persist(&state).await?;
        debug!("[Outbox] Added {}", temp_id);
        Ok(())
    }

    /// Record a provisional message whose send is about to be attempted.
    ///
    /// The outbox record starts claimed, so a concurrent replay skips it
    /// until the sender calls [`mark_dispatched`](Self::mark_dispatched) or
    /// [`release`](Self::release).
    pub async fn add_in_flight(
        &self,
        message: Message,
        destination: String,
        payload: serde_json::Value,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let temp_id = message.id.clone();
        state.outbox.insert(
            temp_id.clone(),
            OutboxRecord {
                destination,
                payload,
                dispatched: false,
                recorded_at: Utc::now(),
            },
        );
        state.in_flight.insert(temp_id.clone());
        state.messages.insert(temp_id.clone(), message);
        self.persist(&state).await?;
        debug!("[Outbox] Added {} (in flight)", temp_id);
        Ok(())
    }

    /// Remove a message and its outbox record.
    pub async fn remove_optimistic(&self, temp_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let removed = state.remove(temp_id);
        if removed {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    /// Purge everything older than `retention`, matched or not.
    pub async fn cleanup_stale(&self, now: DateTime<Utc>, retention: Duration) -> Result<usize> {
        let cutoff = now - retention;
        let mut state = self.state.write().await;

        let mut stale: Vec<String> = state
            .messages
            .iter()
            .filter(|(_, m)| m.created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        stale.extend(
            state
                .outbox
                .iter()
                .filter(|(id, r)| r.recorded_at < cutoff && !state.messages.contains_key(*id))
                .map(|(id, _)| id.clone()),
        );

        for id in &stale {
            state.remove(id);
        }
        if !stale.is_empty() {
            self.persist(&state).await?;
            info!("[Outbox] Purged {} stale entries", stale.len());
        }
        Ok(stale.len())
    }

    /// Run `pass` over the optimistic messages of one conversation and
    /// retire the ids it returns, all under one write lock.
    ///
    /// Readers never observe a partially retired set.
    pub async fn reconcile<R>(
        &self,
        conversation_id: &str,
        pass: impl FnOnce(&[Message]) -> (R, Vec<String>),
    ) -> Result<R> {
        let mut state = self.state.write().await;
        let pending: Vec<Message> = state
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();

        let (result, retired) = pass(&pending);
        let mut changed = false;
        for id in &retired {
            changed |= state.remove(id);
        }
        if changed {
            self.persist(&state).await?;
            debug!("[Outbox] Retired {} confirmed message(s)", retired.len());
        }
        Ok(result)
    }

    pub async fn get(&self, temp_id: &str) -> Option<Message> {
        self.state.read().await.messages.get(temp_id).cloned()
    }

    pub async fn messages_for(&self, conversation_id: &str) -> Vec<Message> {
        self.state
            .read()
            .await
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn outbox_record(&self, temp_id: &str) -> Option<OutboxRecord> {
        self.state.read().await.outbox.get(temp_id).cloned()
    }

    /// Outbox records never handed to a transport and not in flight,
    /// oldest first.
    pub async fn undispatched(&self) -> Vec<(String, OutboxRecord)> {
        pending_records(&*self.state.read().await)
    }

    /// Like [`undispatched`](Self::undispatched), but claims every returned
    /// record under the same lock. Each one must end in `mark_dispatched`
    /// or `release`.
    pub async fn claim_undispatched(&self) -> Vec<(String, OutboxRecord)> {
        let mut state = self.state.write().await;
        let records = pending_records(&state);
        for (temp_id, _) in &records {
            state.in_flight.insert(temp_id.clone());
        }
        records
    }

    /// Give up a claim without dispatching; the record is replayed later.
    pub async fn release(&self, temp_id: &str) {
        self.state.write().await.in_flight.remove(temp_id);
    }

    pub async fn is_in_flight(&self, temp_id: &str) -> bool {
        self.state.read().await.in_flight.contains(temp_id)
    }

    pub async fn mark_dispatched(&self, temp_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.in_flight.remove(temp_id);
        let Some(record) = state.outbox.get_mut(temp_id) else {
            return Ok(());
        };
        if record.dispatched {
            return Ok(());
        }
        record.dispatched = true;
        self.persist(&state).await
    }

    async fn persist(&self, state: &Snapshot) -> Result<()> {
        self.revision.send_modify(|r| *r += 1);
        let Some(path) = &self.path else {
            return Ok(());
        };

        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

fn pending_records(state: &Snapshot) -> Vec<(String, OutboxRecord)> {
    let mut records: Vec<(String, OutboxRecord)> = state
        .outbox
        .iter()
        .filter(|(id, r)| !r.dispatched && !state.in_flight.contains(*id))
        .map(|(id, r)| (id.clone(), r.clone()))
        .collect();
    records.sort_by_key(|(_, r)| r.recorded_at);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn optimistic(conversation: &str, body: &str, at: DateTime<Utc>) -> Message {
        Message::optimistic(conversation, "me", body, at)
    }

    #[tokio::test]
    async fn test_restores_verbatim() {
        let dir = tempdir().unwrap();
        let path = OptimisticStore::path_in(dir.path());
        assert!(path.ends_with("blink.optimistic.v1.json"));

        let msg = optimistic("c1", "hello", Utc::now());
        {
            let store = OptimisticStore::open(&path).await.unwrap();
            store
                .add_optimistic(
                    msg.clone(),
                    Some(("/app/chat.sendMessage".into(), serde_json::json!({"body": "hello"}))),
                )
                .await
                .unwrap();
        }

        let store = OptimisticStore::open(&path).await.unwrap();
        assert_eq!(store.get(&msg.id).await, Some(msg.clone()));
        let record = store.outbox_record(&msg.id).await.unwrap();
        assert_eq!(record.destination, "/app/chat.sendMessage");
        assert!(!record.dispatched);
        assert!(!dir.path().join("blink.optimistic.v1.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = OptimisticStore::path_in(dir.path());
        std::fs::write(&path, "{not json").unwrap();
        let store = OptimisticStore::open(&path).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_drops_outbox_record() {
        let store = OptimisticStore::in_memory();
        let msg = optimistic("c1", "x", Utc::now());
        store
            .add_optimistic(msg.clone(), Some(("/d".into(), serde_json::Value::Null)))
            .await
            .unwrap();

        assert!(store.remove_optimistic(&msg.id).await.unwrap());
        assert!(store.get(&msg.id).await.is_none());
        assert!(store.outbox_record(&msg.id).await.is_none());
        assert!(!store.remove_optimistic(&msg.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_purges_old_entries_only() {
        let store = OptimisticStore::in_memory();
        let now = Utc::now();
        let old = optimistic("c1", "old", now - Duration::hours(25));
        let fresh = optimistic("c1", "fresh", now - Duration::hours(1));
        store.add_optimistic(old.clone(), None).await.unwrap();
        store.add_optimistic(fresh.clone(), None).await.unwrap();

        let purged = store.cleanup_stale(now, Duration::hours(24)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get(&old.id).await.is_none());
        assert!(store.get(&fresh.id).await.is_some());
    }

    #[tokio::test]
    async fn test_undispatched_skips_dispatched() {
        let store = OptimisticStore::in_memory();
        let a = optimistic("c1", "a", Utc::now());
        let b = optimistic("c1", "b", Utc::now());
        store
            .add_optimistic(a.clone(), Some(("/d".into(), serde_json::json!(1))))
            .await
            .unwrap();
        store
            .add_optimistic(b.clone(), Some(("/d".into(), serde_json::json!(2))))
            .await
            .unwrap();
        store.mark_dispatched(&a.id).await.unwrap();

        let pending = store.undispatched().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, b.id);
    }

    #[tokio::test]
    async fn test_in_flight_record_is_not_claimed_twice() {
        let store = OptimisticStore::in_memory();
        let queued = optimistic("c1", "queued", Utc::now());
        let sending = optimistic("c1", "sending", Utc::now());
        store
            .add_optimistic(queued.clone(), Some(("/d".into(), serde_json::json!(1))))
            .await
            .unwrap();
        store
            .add_in_flight(sending.clone(), "/d".into(), serde_json::json!(2))
            .await
            .unwrap();
        assert!(store.is_in_flight(&sending.id).await);

        let claimed = store.claim_undispatched().await;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].0, queued.id);
        assert!(store.claim_undispatched().await.is_empty());

        // A failed send hands the record back for the next replay.
        store.release(&sending.id).await;
        let claimed = store.claim_undispatched().await;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].0, sending.id);

        store.mark_dispatched(&sending.id).await.unwrap();
        assert!(!store.is_in_flight(&sending.id).await);
        assert!(store.outbox_record(&sending.id).await.unwrap().dispatched);
    }

    #[tokio::test]
    async fn test_claims_do_not_survive_restart() {
        let dir = tempdir().unwrap();
        let path = OptimisticStore::path_in(dir.path());
        let msg = optimistic("c1", "hello", Utc::now());
        {
            let store = OptimisticStore::open(&path).await.unwrap();
            store
                .add_in_flight(msg.clone(), "/d".into(), serde_json::json!(1))
                .await
                .unwrap();
            assert!(store.undispatched().await.is_empty());
        }

        let store = OptimisticStore::open(&path).await.unwrap();
        let pending = store.undispatched().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, msg.id);
    }

    #[tokio::test]
    async fn test_reconcile_retires_atomically() {
        let store = OptimisticStore::in_memory();
        let a = optimistic("c1", "a", Utc::now());
        let other = optimistic("c2", "a", Utc::now());
        store.add_optimistic(a.clone(), None).await.unwrap();
        store.add_optimistic(other.clone(), None).await.unwrap();
        let mut changes = store.changes();
        changes.borrow_and_update();

        let seen = store
            .reconcile("c1", |pending| (pending.len(), vec![a.id.clone()]))
            .await
            .unwrap();
        assert_eq!(seen, 1);
        assert!(store.get(&a.id).await.is_none());
        assert!(store.get(&other.id).await.is_some());
        assert!(changes.has_changed().unwrap());
    }
}
