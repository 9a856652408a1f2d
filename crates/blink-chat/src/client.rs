//! Application-level entry point tying the connection, REST API and
//! optimistic store together.

use crate::api::ChatApi;
use crate::calls::CallNotifications;
use crate::config::ChatConfig;
use crate::error::Result;
use crate::identity::Identity;
use crate::optimistic::OptimisticStore;
use crate::presence::PresenceTracker;
use crate::session::ConversationSession;
use blink_realtime::{ConnectionManager, ConnectionStatus};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns the long-lived chat state of one signed-in user.
///
/// Constructed once at startup with [`init`](Self::init) and torn down with
/// [`shutdown`](Self::shutdown).
pub struct ChatClient {
    config: ChatConfig,
    identity: Identity,
    manager: ConnectionManager,
    api: Arc<dyn ChatApi>,
    store: Arc<OptimisticStore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatClient {
    /// Restore the optimistic store from `store_path` (in memory when
    /// `None`), purge stale entries and start the maintenance tasks.
    ///
    /// Does not connect; call [`connect`](Self::connect) once a credential
    /// is available.
    pub async fn init(
        config: ChatConfig,
        identity: Identity,
        manager: ConnectionManager,
        api: Arc<dyn ChatApi>,
        store_path: Option<PathBuf>,
    ) -> Result<Self> {
        let store = match store_path {
            Some(path) => OptimisticStore::open(path).await?,
            None => OptimisticStore::in_memory(),
        };
        let store = Arc::new(store);
        store.cleanup_stale(Utc::now(), config.retention).await?;

        let mut tasks = vec![tokio::spawn(cleanup_task(
            store.clone(),
            config.retention,
            config.cleanup_interval,
        ))];
        if config.replay_outbox {
            tasks.push(tokio::spawn(replay_task(
                manager.clone(),
                store.clone(),
                manager.status(),
            )));
        }

        info!(
            "[Outbox] Chat client ready ({} pending message(s))",
            store.len().await
        );
        Ok(Self {
            config,
            identity,
            manager,
            api,
            store,
            tasks: Mutex::new(tasks),
        })
    }

    pub async fn connect(&self) -> Result<()> {
        Ok(self.manager.connect().await?)
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<OptimisticStore> {
        &self.store
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.manager.status()
    }

    pub fn open_conversation(&self, conversation_id: impl Into<String>) -> ConversationSession {
        ConversationSession::open(
            conversation_id,
            self.config.clone(),
            self.identity.clone(),
            self.manager.clone(),
            self.api.clone(),
            self.store.clone(),
        )
    }

    /// Follow the online status of other users.
    pub fn track_presence(&self) -> PresenceTracker {
        PresenceTracker::start(&self.manager)
    }

    /// Receive calls addressed to this user.
    pub fn call_notifications(&self) -> CallNotifications {
        CallNotifications::start(&self.manager, self.identity.clone())
    }

    /// Hand every undispatched outbox record to the connection. Returns how
    /// many were sent.
    pub async fn replay_outbox(&self) -> Result<usize> {
        replay_outbox(&self.manager, &self.store).await
    }

    /// Disconnect and stop the maintenance tasks.
    pub fn shutdown(&self) {
        self.manager.disconnect();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("[Outbox] Chat client shut down");
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn replay_outbox(manager: &ConnectionManager, store: &OptimisticStore) -> Result<usize> {
    let mut sent = 0;
    let mut outcome = Ok(());
    let mut claimed = store.claim_undispatched().await.into_iter();
    for (temp_id, record) in claimed.by_ref() {
        if !manager.send(&record.destination, &record.payload) {
            store.release(&temp_id).await;
            break;
        }
        if let Err(e) = store.mark_dispatched(&temp_id).await {
            outcome = Err(e);
            break;
        }
        sent += 1;
    }
    for (temp_id, _) in claimed {
        store.release(&temp_id).await;
    }
    outcome?;
    if sent > 0 {
        info!("[Outbox] Replayed {} message(s)", sent);
    }
    Ok(sent)
}

async fn replay_task(
    manager: ConnectionManager,
    store: Arc<OptimisticStore>,
    mut status: watch::Receiver<ConnectionStatus>,
) {
    loop {
        let connected = status.borrow_and_update().is_connected();
        if connected {
            if let Err(e) = replay_outbox(&manager, &store).await {
                warn!("[Outbox] Replay failed: {}", e);
            }
        }
        if status.changed().await.is_err() {
            break;
        }
    }
    debug!("[Outbox] Replay watcher stopped");
}

async fn cleanup_task(store: Arc<OptimisticStore>, retention: Duration, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately; init already purged.
    interval.tick().await;
    loop {
        interval.tick().await;
        if let Err(e) = store.cleanup_stale(Utc::now(), retention).await {
            warn!("[Outbox] Cleanup failed: {}", e);
        }
    }
}
