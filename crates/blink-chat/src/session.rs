//! One open conversation: its timeline, topic registrations and sends.

use crate::api::{ChatApi, MAX_BODY_CHARS};
use crate::config::{ChatConfig, SendRoute};
use crate::error::{ChatError, Result};
use crate::identity::Identity;
use crate::models::{HistoryPage, Message};
use crate::optimistic::OptimisticStore;
use crate::pagination::Paginator;
use crate::reconcile::{Entry, Timeline};
use crate::separators::{with_separators, TimelineItem};
use crate::topics;
use crate::typing::{TypingEvent, TypingSet};
use blink_realtime::{ConnectionManager, Subscription};
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Handle to an open conversation.
///
/// Dropping it (or calling [`close`](Self::close)) releases exactly the two
/// topic registrations it made.
pub struct ConversationSession {
    inner: Arc<SessionInner>,
    subscriptions: Vec<Subscription>,
}

struct SessionInner {
    conversation_id: String,
    config: ChatConfig,
    identity: Identity,
    manager: ConnectionManager,
    api: Arc<dyn ChatApi>,
    store: Arc<OptimisticStore>,
    timeline: Mutex<Timeline>,
    paginator: Mutex<Paginator>,
    typing: Mutex<TypingSet>,
    revision: watch::Sender<u64>,
}

impl SessionInner {
    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn on_message(&self, payload: serde_json::Value) {
        match Message::from_wire(payload, Some(&self.conversation_id), &self.identity) {
            Ok(message) => {
                let id = message.id.clone();
                if self.timeline.lock().push_live(message) {
                    debug!("[Reconcile] Live {} in {}", id, self.conversation_id);
                    self.bump();
                }
            }
            Err(e) => warn!("[Reconcile] Dropping live message: {}", e),
        }
    }

    fn on_typing(&self, payload: serde_json::Value) {
        match serde_json::from_value::<TypingEvent>(payload) {
            Ok(event) => {
                let changed = self
                    .typing
                    .lock()
                    .apply(event, &self.conversation_id, &self.identity);
                if changed {
                    self.bump();
                }
            }
            Err(e) => warn!("[Reconcile] Dropping typing event: {}", e),
        }
    }
}

impl ConversationSession {
    pub(crate) fn open(
        conversation_id: impl Into<String>,
        config: ChatConfig,
        identity: Identity,
        manager: ConnectionManager,
        api: Arc<dyn ChatApi>,
        store: Arc<OptimisticStore>,
    ) -> Self {
        let conversation_id = conversation_id.into();
        let (revision, _) = watch::channel(0);
        let inner = Arc::new(SessionInner {
            timeline: Mutex::new(Timeline::new(
                conversation_id.clone(),
                identity.clone(),
                config.match_window,
            )),
            paginator: Mutex::new(Paginator::new()),
            typing: Mutex::new(TypingSet::default()),
            conversation_id,
            config,
            identity,
            manager,
            api,
            store,
            revision,
        });

        let weak: Weak<SessionInner> = Arc::downgrade(&inner);
        let messages = inner.manager.subscribe(
            topics::conversation(&inner.conversation_id),
            move |payload| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_message(payload);
                }
            },
        );
        let weak: Weak<SessionInner> = Arc::downgrade(&inner);
        let typing = inner.manager.subscribe(
            topics::conversation_typing(&inner.conversation_id),
            move |payload| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_typing(payload);
                }
            },
        );

        info!("[Reconcile] Opened conversation {}", inner.conversation_id);
        Self {
            inner,
            subscriptions: vec![messages, typing],
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    /// Bumped whenever something that affects rendering arrives.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn has_more(&self) -> bool {
        self.inner.paginator.lock().has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.paginator.lock().is_fetching()
    }

    /// Fetch the next older page.
    ///
    /// Returns `Ok(false)` without touching the network when a fetch is
    /// already in flight or history is exhausted.
    pub async fn load_older(&self) -> Result<bool> {
        let Some(page) = self.inner.paginator.lock().begin() else {
            return Ok(false);
        };
        let inner = &self.inner;

        let fetched = inner
            .api
            .fetch_page(&inner.conversation_id, page, inner.config.page_size)
            .await
            .and_then(|raw| {
                HistoryPage::from_wire(raw, page, &inner.conversation_id, &inner.identity)
            });
        let mut history = match fetched {
            Ok(history) => history,
            Err(e) => {
                inner.paginator.lock().fail();
                warn!(
                    "[Reconcile] Page {} of {} failed: {}",
                    page, inner.conversation_id, e
                );
                return Err(e);
            }
        };

        if history.number != page {
            warn!(
                "[Reconcile] Asked for page {} of {}, server answered {}",
                page, inner.conversation_id, history.number
            );
            history.number = page;
        }
        debug!(
            "[Reconcile] Page {} of {}: {} message(s), last={}",
            history.number,
            inner.conversation_id,
            history.messages.len(),
            history.last
        );
        inner.paginator.lock().complete(&history);
        inner.timeline.lock().apply_page(history);
        inner.bump();
        Ok(true)
    }

    /// Send a message, showing it immediately as an optimistic entry.
    ///
    /// On the REST route a failed post is returned as an error; the
    /// optimistic entry stays and its outbox record is replayed on the next
    /// connect.
    pub async fn send(&self, body: &str) -> Result<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ChatError::Rejected("empty message".to_string()));
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(ChatError::Rejected(format!(
                "message longer than {} characters",
                MAX_BODY_CHARS
            )));
        }

        let inner = &self.inner;
        let message = Message::optimistic(
            inner.conversation_id.clone(),
            inner.identity.self_sender(),
            body,
            Utc::now(),
        );
        let payload = topics::send_payload(&inner.conversation_id, body);
        inner
            .store
            .add_in_flight(message.clone(), topics::SEND_MESSAGE.to_string(), payload.clone())
            .await?;
        inner.bump();

        match inner.config.send_route {
            SendRoute::Socket => {
                if inner.manager.send(topics::SEND_MESSAGE, &payload) {
                    inner.store.mark_dispatched(&message.id).await?;
                } else {
                    inner.store.release(&message.id).await;
                    debug!("[Outbox] {} queued until reconnect", message.id);
                }
            }
            SendRoute::Rest => {
                let response = match inner.api.send_message(&inner.conversation_id, body).await {
                    Ok(response) => response,
                    Err(e) => {
                        inner.store.release(&message.id).await;
                        return Err(e);
                    }
                };
                inner.store.mark_dispatched(&message.id).await?;
                match Message::from_wire(response, Some(&inner.conversation_id), &inner.identity) {
                    Ok(confirmed) => {
                        inner.timeline.lock().push_live(confirmed);
                        inner.bump();
                    }
                    Err(e) => warn!("[Reconcile] Unreadable send response: {}", e),
                }
            }
        }
        Ok(message)
    }

    /// Publish this user's typing state. Returns whether it was handed to
    /// the connection.
    pub fn set_typing(&self, typing: bool) -> bool {
        self.inner.manager.send(
            topics::TYPING,
            &topics::typing_payload(&self.inner.conversation_id, typing),
        )
    }

    /// Other users currently typing.
    pub fn typing_users(&self) -> Vec<String> {
        self.inner.typing.lock().users()
    }

    /// The merged, ordered timeline.
    ///
    /// Optimistic entries matched in this pass are retired from the store
    /// in the same step.
    pub async fn render(&self) -> Result<Vec<Entry>> {
        let inner = &self.inner;
        inner
            .store
            .reconcile(&inner.conversation_id, |pending| {
                let merge = inner.timeline.lock().merge(pending);
                (merge.entries, merge.retired)
            })
            .await
    }

    /// [`render`](Self::render) with day separators in `tz`.
    pub async fn render_with_separators<Tz: TimeZone>(
        &self,
        tz: &Tz,
        today: NaiveDate,
    ) -> Result<Vec<TimelineItem>> {
        Ok(with_separators(self.render().await?, tz, today))
    }

    /// Release this session's registrations.
    pub fn close(mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        info!("[Reconcile] Closed conversation {}", self.inner.conversation_id);
    }
}
