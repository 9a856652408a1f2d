//! Conversation timelines for the Blink chat client.
//!
//! Three sources feed a conversation: paged history fetched over REST, live
//! messages pushed on the realtime connection, and optimistic messages the
//! user has just sent. [`ConversationSession::render`] merges them into one
//! deduplicated, chronological sequence and retires optimistic entries once
//! their confirmed copy shows up.

pub mod api;
pub mod calls;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod models;
pub mod optimistic;
pub mod pagination;
pub mod presence;
pub mod reconcile;
pub mod separators;
pub mod session;
pub mod topics;
pub mod typing;

pub use api::{ChatApi, HttpChatApi};
pub use calls::{CallNotification, CallNotifications};
pub use client::ChatClient;
pub use config::{ChatConfig, SendRoute};
pub use credentials::StoredCredentialSource;
pub use error::{ChatError, Result};
pub use identity::Identity;
pub use models::{HistoryPage, Message, MessageStatus};
pub use optimistic::{OptimisticStore, OutboxRecord};
pub use pagination::{Paginator, ViewportAnchor};
pub use presence::{PresenceEvent, PresenceMap, PresenceTracker};
pub use reconcile::{Entry, Merge, Provenance, Timeline};
pub use separators::{day_label, with_separators, TimelineItem};
pub use session::ConversationSession;
pub use typing::{TypingEvent, TypingSet};
