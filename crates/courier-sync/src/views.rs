//! Derived view-model helpers: conversation-list ordering, calendar-day
//! grouping, delivery states. Pure functions over decoded records: the
//! reconcilers recompute these from the latest snapshot instead of patching
//! state incrementally.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use courier_shared::time::{to_datetime, Millis};
use courier_store::{Conversation, Message};

/// Local delivery state of a timeline entry. `Sending` and `Failed` exist
/// only for the local user's optimistic placeholders; everything decoded
/// from a snapshot is `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDelivery {
    Confirmed,
    Sending,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub message: Message,
    pub delivery: LocalDelivery,
    /// Confirmed server timestamp, or the optimistic local timestamp while
    /// the placeholder awaits one.
    pub sort_key: Millis,
}

/// One calendar day of the timeline, ascending.
#[derive(Debug, Clone)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub label: String,
    pub entries: Vec<TimelineEntry>,
}

/// Order a conversation list in place: pinned first, then last-message
/// time descending, ties broken by id for determinism.
pub fn sort_conversations(list: &mut [Conversation]) {
    list.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| activity_key(b).cmp(&activity_key(a)))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn activity_key(conversation: &Conversation) -> Millis {
    conversation
        .last_message
        .as_ref()
        .map(|last| last.timestamp)
        .unwrap_or(conversation.created_at)
}

/// Group ascending timeline entries by calendar day.
pub fn group_by_day(entries: Vec<TimelineEntry>, now: DateTime<Utc>) -> Vec<DayGroup> {
    let today = now.date_naive();
    let mut groups: Vec<DayGroup> = Vec::new();
    for entry in entries {
        let date = to_datetime(entry.sort_key).date_naive();
        match groups.last_mut() {
            Some(group) if group.date == date => group.entries.push(entry),
            _ => groups.push(DayGroup {
                date,
                label: day_label(date, today),
                entries: vec![entry],
            }),
        }
    }
    groups
}

/// "Today", "Yesterday", or a date.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.signed_duration_since(date).num_days() == 1 {
        "Yesterday".to_string()
    } else if date.year() == today.year() {
        date.format("%e %B").to_string().trim_start().to_string()
    } else {
        date.format("%e %B %Y").to_string().trim_start().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_shared::types::{ConversationId, ConversationKind, MessageId, MessageStatus, UserId};
    use courier_store::{LastMessage, MessageBody};
    use std::collections::BTreeMap;

    fn conversation(id: &str, pinned: bool, last_ts: Option<Millis>) -> Conversation {
        Conversation {
            id: ConversationId(id.into()),
            kind: ConversationKind::Direct,
            members: vec![UserId::new("a"), UserId::new("b")],
            name: None,
            last_message: last_ts.map(|timestamp| LastMessage {
                text: "x".into(),
                timestamp,
                sender: UserId::new("a"),
                sender_name: None,
            }),
            unread: BTreeMap::new(),
            cleared: BTreeMap::new(),
            pinned,
            pinned_message: None,
            created_at: 0,
        }
    }

    #[test]
    fn pinned_first_then_recency_then_id() {
        let mut list = vec![
            conversation("c", false, Some(300)),
            conversation("b", false, Some(300)),
            conversation("a", false, Some(100)),
            conversation("p", true, Some(50)),
        ];
        sort_conversations(&mut list);
        let ids: Vec<&str> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["p", "b", "c", "a"]);
    }

    fn entry(ts: Millis) -> TimelineEntry {
        TimelineEntry {
            message: Message {
                id: MessageId::new(),
                sender: UserId::new("a"),
                body: MessageBody::text("hi"),
                timestamp: Some(ts),
                status: MessageStatus::Sent,
                edited: false,
                reply: None,
                reactions: BTreeMap::new(),
            },
            delivery: LocalDelivery::Confirmed,
            sort_key: ts,
        }
    }

    #[test]
    fn grouping_splits_on_day_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let yesterday_noon = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let groups = group_by_day(
            vec![
                entry(yesterday_noon.timestamp_millis()),
                entry(yesterday_noon.timestamp_millis() + 1000),
                entry(now.timestamp_millis()),
            ],
            now,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "Yesterday");
        assert_eq!(groups[0].entries.len(), 2);
        assert_eq!(groups[1].label, "Today");
    }

    #[test]
    fn old_dates_get_calendar_labels() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let same_year = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let other_year = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert_eq!(day_label(same_year, today), "15 January");
        assert_eq!(day_label(other_year, today), "15 January 2023");
    }
}
