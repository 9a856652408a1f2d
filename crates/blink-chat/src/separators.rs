//! Calendar-day separators between rendered messages.

use crate::reconcile::Entry;
use chrono::{Duration, NaiveDate, TimeZone};

/// Rendered row: a day boundary or a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineItem {
    Separator { date: NaiveDate, label: String },
    Message(Entry),
}

/// "Today", "Yesterday", "Tomorrow", or `DD-MM-YYYY`.
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if Some(day) == today.checked_sub_signed(Duration::days(1)) {
        "Yesterday".to_string()
    } else if Some(day) == today.checked_add_signed(Duration::days(1)) {
        "Tomorrow".to_string()
    } else {
        day.format("%d-%m-%Y").to_string()
    }
}

/// Insert a separator before the first entry and wherever two consecutive
/// entries fall on different calendar days in `tz`.
pub fn with_separators<Tz: TimeZone>(entries: Vec<Entry>, tz: &Tz, today: NaiveDate) -> Vec<TimelineItem> {
    let mut out = Vec::with_capacity(entries.len() + 1);
    let mut current: Option<NaiveDate> = None;
    for entry in entries {
        let day = entry.message.created_at.with_timezone(tz).date_naive();
        if current != Some(day) {
            out.push(TimelineItem::Separator {
                date: day,
                label: day_label(day, today),
            });
            current = Some(day);
        }
        out.push(TimelineItem::Message(entry));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, MessageStatus};
    use crate::reconcile::Provenance;
    use chrono::{DateTime, FixedOffset, Utc};

    fn entry(id: &str, at: &str) -> Entry {
        Entry {
            message: Message {
                id: id.into(),
                conversation_id: "c1".into(),
                sender_id: "u1".into(),
                recipient_id: None,
                body: "x".into(),
                created_at: DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc),
                status: MessageStatus::Sent,
                deleted: false,
            },
            provenance: Provenance::History,
        }
    }

    fn separators(items: &[TimelineItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(|i| match i {
                TimelineItem::Separator { label, .. } => Some(label.clone()),
                TimelineItem::Message(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_separator_between_days() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let items = with_separators(
            vec![
                entry("a", "2024-01-01T23:59:00Z"),
                entry("b", "2024-01-02T00:01:00Z"),
            ],
            &Utc,
            today,
        );
        assert_eq!(items.len(), 4);
        assert!(matches!(items[2], TimelineItem::Separator { .. }));
        assert_eq!(separators(&items), vec!["Yesterday", "Today"]);
    }

    #[test]
    fn test_same_day_has_no_separator() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let items = with_separators(
            vec![
                entry("a", "2024-01-01T10:00:00Z"),
                entry("b", "2024-01-01T10:01:00Z"),
            ],
            &Utc,
            today,
        );
        assert_eq!(separators(&items), vec!["01-01-2024"]);
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_days_follow_the_given_zone() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let items = with_separators(
            vec![
                entry("a", "2024-01-01T21:59:00Z"),
                entry("b", "2024-01-01T22:01:00Z"),
            ],
            &plus_two,
            today,
        );
        assert_eq!(separators(&items), vec!["01-01-2024", "02-01-2024"]);
    }

    #[test]
    fn test_relative_labels() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(), today), "Yesterday");
        assert_eq!(day_label(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), today), "Tomorrow");
        assert_eq!(day_label(NaiveDate::from_ymd_opt(2023, 12, 25).unwrap(), today), "25-12-2023");
    }

    #[test]
    fn test_empty_input() {
        assert!(with_separators(Vec::new(), &Utc, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).is_empty());
    }
}
