//! Message model and boundary normalization.
//!
//! Every payload is converted into [`Message`] / [`HistoryPage`] as soon as it
//! arrives. Nothing downstream looks at the wire shape again.

use crate::error::{ChatError, Result};
use crate::identity::Identity;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of ids generated for locally created messages.
pub const TEMP_ID_PREFIX: &str = "temp-";

static CONFIRMED_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").unwrap());

/// Whether `id` has the server's confirmed-id shape (time-ordered).
pub fn is_confirmed_id(id: &str) -> bool {
    CONFIRMED_ID_REGEX.is_match(id)
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

pub fn new_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
}

/// A chat message after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    /// Tombstone
    #[serde(default)]
    pub deleted: bool,
}

impl Message {
    /// A provisional message created at send time.
    pub fn optimistic(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_temp_id(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            recipient_id: None,
            body: body.into(),
            created_at,
            status: MessageStatus::Sending,
            deleted: false,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        !is_temp_id(&self.id)
    }

    /// Normalize one message payload.
    ///
    /// `conversation_hint` fills in a missing conversation id (history pages
    /// and topic deliveries are already scoped to one conversation).
    pub fn from_wire(value: Value, conversation_hint: Option<&str>, identity: &Identity) -> Result<Self> {
        let wire: WireMessage = serde_json::from_value(value)?;

        let id = wire
            .id
            .as_ref()
            .and_then(id_string)
            .ok_or_else(|| ChatError::InvalidPayload("message without id".to_string()))?;
        let created_at = wire
            .created_at
            .as_ref()
            .or(wire.timestamp.as_ref())
            .and_then(parse_timestamp)
            .ok_or_else(|| ChatError::InvalidPayload(format!("message {} has no usable timestamp", id)))?;
        let conversation_id = wire
            .conversation_id
            .or_else(|| conversation_hint.map(str::to_string))
            .ok_or_else(|| ChatError::InvalidPayload(format!("message {} has no conversation", id)))?;

        Ok(Message {
            id,
            conversation_id,
            sender_id: identity.resolve(wire.sender_id.as_deref().unwrap_or_default()),
            recipient_id: wire.recipient_id,
            body: wire.body.or(wire.content).unwrap_or_default(),
            created_at,
            status: if wire.seen {
                MessageStatus::Delivered
            } else {
                MessageStatus::Sent
            },
            deleted: wire.deleted,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: Option<Value>,
    conversation_id: Option<String>,
    sender_id: Option<String>,
    recipient_id: Option<String>,
    body: Option<String>,
    content: Option<String>,
    created_at: Option<Value>,
    timestamp: Option<Value>,
    #[serde(default)]
    seen: bool,
    #[serde(default)]
    deleted: bool,
}

/// Ids arrive as strings, numbers, or `{"$oid": "..."}`.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Parse a wire timestamp into UTC.
///
/// Accepts RFC 3339, zone-less ISO date-times (taken as UTC), epoch
/// milliseconds, and `[y, m, d, h, min, s, nanos]` arrays.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Array(parts) => {
            let part = |i: usize| parts.get(i).and_then(Value::as_u64).unwrap_or(0) as u32;
            let year = parts.first().and_then(Value::as_i64)? as i32;
            let date = NaiveDate::from_ymd_opt(year, part(1), part(2))?;
            date.and_hms_nano_opt(part(3), part(4), part(5), part(6))
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}

/// One page of history, whatever shape it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub number: u32,
    pub last: bool,
    pub messages: Vec<Message>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePage {
    Paged {
        content: Vec<Value>,
        #[serde(default)]
        last: Option<bool>,
        #[serde(default)]
        number: Option<u32>,
    },
    Legacy((String, Vec<Value>)),
    Plain(Vec<Value>),
}

impl HistoryPage {
    pub fn empty(number: u32) -> Self {
        Self {
            number,
            last: true,
            messages: Vec::new(),
        }
    }

    /// Normalize a history response for `requested` page of `conversation_id`.
    ///
    /// Individual messages that cannot be normalized are dropped with a
    /// warning; an unrecognized envelope is an error.
    pub fn from_wire(
        value: Value,
        requested: u32,
        conversation_id: &str,
        identity: &Identity,
    ) -> Result<Self> {
        let (raw, last, number) = match serde_json::from_value::<WirePage>(value) {
            Ok(WirePage::Paged {
                content,
                last,
                number,
            }) => {
                let last = last.unwrap_or(content.is_empty());
                (content, last, number.unwrap_or(requested))
            }
            Ok(WirePage::Legacy((_cursor, items))) => {
                let last = items.is_empty();
                (items, last, requested)
            }
            Ok(WirePage::Plain(items)) => {
                let last = items.is_empty();
                (items, last, requested)
            }
            Err(e) => {
                return Err(ChatError::InvalidPayload(format!(
                    "unrecognized history page: {}",
                    e
                )))
            }
        };

        let messages = raw
            .into_iter()
            .filter_map(|item| match Message::from_wire(item, Some(conversation_id), identity) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("[Reconcile] Dropping history entry: {}", e);
                    None
                }
            })
            .collect();

        Ok(HistoryPage {
            number,
            last,
            messages,
        })
    }

    /// Index of the next older page, if there is one.
    pub fn next_page(&self) -> Option<u32> {
        if self.messages.is_empty() || self.last {
            None
        } else {
            Some(self.number + 1)
        }
    }
}
