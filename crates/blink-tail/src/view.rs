use blink_chat::{Identity, MessageStatus, Provenance, TimelineItem};
use chrono::TimeZone;

/// One printable line per timeline row.
pub fn lines<Tz: TimeZone>(items: &[TimelineItem], identity: &Identity, tz: &Tz) -> Vec<String>
where
    Tz::Offset: std::fmt::Display,
{
    items
        .iter()
        .map(|item| match item {
            TimelineItem::Separator { label, .. } => format!("---- {} ----", label),
            TimelineItem::Message(entry) => {
                let message = &entry.message;
                let who = if identity.is_self(&message.sender_id) {
                    "you".to_string()
                } else {
                    message.sender_id.clone()
                };
                let marker = match (entry.provenance, message.status) {
                    (Provenance::Optimistic, _) => " (sending...)",
                    (_, MessageStatus::Delivered) => " (seen)",
                    _ => "",
                };
                format!(
                    "[{}] {}: {}{}",
                    message.created_at.with_timezone(tz).format("%H:%M"),
                    who,
                    message.body,
                    marker
                )
            }
        })
        .collect()
}
