//! Presence: publishing the local user's online state and observing peers.
//!
//! Publishing is best-effort: a failed write is logged and retried on the
//! next trigger, never surfaced. Repeated "online" publishes are throttled;
//! the "going away" edge always writes immediately because losing that
//! signal is worse than an extra write.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use courier_shared::time::{to_datetime, Millis};
use courier_shared::types::UserId;
use courier_store::{
    DocPath, FieldOp, FieldPath, PresenceRecord, Query, StoreHandle, Subscription,
};

use crate::config::SyncConfig;
use crate::error::Result;

/// Application lifecycle transitions that drive presence, reported by the
/// embedding shell (window focus, visibility change, shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Focused,
    Blurred,
    Closing,
}

pub struct PresenceManager {
    store: StoreHandle,
    user: UserId,
    display_name: String,
    min_publish: Duration,
    last_online_publish: Option<Instant>,
}

impl PresenceManager {
    pub fn new(
        store: StoreHandle,
        user: UserId,
        display_name: impl Into<String>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            user,
            display_name: display_name.into(),
            min_publish: config.presence_min_publish,
            last_online_publish: None,
        }
    }

    /// Publish the local user's presence record.
    pub async fn publish(&mut self, online: bool) {
        if online && !self.due(Instant::now()) {
            return;
        }
        let ops = vec![
            FieldOp::Set(FieldPath::new("id"), json!(self.user)),
            FieldOp::Set(FieldPath::new("display_name"), json!(self.display_name)),
            FieldOp::Set(FieldPath::new("online"), json!(online)),
            FieldOp::SetServerTime(FieldPath::new("last_active")),
        ];
        match self.store.update(DocPath::presence(&self.user), ops).await {
            Ok(()) => {
                self.last_online_publish = online.then(Instant::now);
                debug!(user = %self.user, online, "presence published");
            }
            Err(error) => {
                // Best-effort: the next trigger retries.
                warn!(user = %self.user, %error, "presence publish failed");
                self.last_online_publish = None;
            }
        }
    }

    /// Whether an "online" publish is due at `now` under the throttle.
    fn due(&self, now: Instant) -> bool {
        match self.last_online_publish {
            None => true,
            Some(at) => now.duration_since(at) >= self.min_publish,
        }
    }

    /// Map a lifecycle transition to a presence write.
    pub async fn handle_lifecycle(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Focused => self.publish(true).await,
            LifecycleEvent::Blurred | LifecycleEvent::Closing => self.publish(false).await,
        }
    }

    /// Periodic refresh while the application stays focused; subject to the
    /// same throttle as any other online publish.
    pub async fn heartbeat(&mut self) {
        self.publish(true).await;
    }

    /// Live view of a peer's presence.
    pub async fn observe(&self, peer: &UserId) -> Result<PresenceWatch> {
        let sub = self
            .store
            .subscribe(Query::doc(DocPath::presence(peer)))
            .await?;
        Ok(PresenceWatch {
            sub,
            peer: peer.clone(),
        })
    }
}

pub struct PresenceWatch {
    sub: Subscription,
    peer: UserId,
}

impl PresenceWatch {
    /// Next presence view, or `None` once the subscription ends.
    pub async fn next(&mut self) -> Option<PresenceView> {
        loop {
            let snapshot = self.sub.next().await?;
            match snapshot.first() {
                None => {
                    return Some(PresenceView {
                        user: self.peer.clone(),
                        display_name: String::new(),
                        online: false,
                        last_active: 0,
                    })
                }
                Some(doc) => match doc.decode::<PresenceRecord>() {
                    Ok(record) => {
                        return Some(PresenceView {
                            user: record.id,
                            display_name: record.display_name,
                            online: record.online,
                            last_active: record.last_active,
                        })
                    }
                    Err(error) => {
                        warn!(peer = %self.peer, %error, "skipping undecodable presence record");
                        continue;
                    }
                },
            }
        }
    }

    pub async fn cancel(&mut self) {
        self.sub.cancel().await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceView {
    pub user: UserId,
    pub display_name: String,
    pub online: bool,
    pub last_active: Millis,
}

impl PresenceView {
    pub fn label(&self) -> String {
        self.label_at(Utc::now())
    }

    /// Derived human label, evaluated against an explicit clock.
    pub fn label_at(&self, now: DateTime<Utc>) -> String {
        last_seen_label(self.online, self.last_active, now)
    }
}

/// "online" while the flag is true; otherwise a relative/absolute "last
/// seen" phrase with fixed priority: under a minute, under an hour, same
/// calendar day, previous day, then a plain date.
pub fn last_seen_label(online: bool, last_active: Millis, now: DateTime<Utc>) -> String {
    if online {
        return "online".to_string();
    }
    if last_active <= 0 {
        return "last seen recently".to_string();
    }
    let then = to_datetime(last_active);
    let elapsed = now.signed_duration_since(then);
    if elapsed.num_seconds() < 60 {
        return "last seen just now".to_string();
    }
    if elapsed.num_minutes() < 60 {
        return format!("last seen {} minutes ago", elapsed.num_minutes());
    }
    let time = then.format("%H:%M");
    if then.date_naive() == now.date_naive() {
        return format!("last seen today at {time}");
    }
    if now
        .date_naive()
        .signed_duration_since(then.date_naive())
        .num_days()
        == 1
    {
        return format!("last seen yesterday at {time}");
    }
    let date = then.format("%e %B %Y").to_string();
    format!("last seen {}", date.trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_store::spawn_memory_store;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn label_priority_ladder() {
        let now = at(2024, 5, 2, 12, 0);
        let ms = |dt: DateTime<Utc>| dt.timestamp_millis();

        assert_eq!(last_seen_label(true, 0, now), "online");
        assert_eq!(last_seen_label(false, 0, now), "last seen recently");
        assert_eq!(
            last_seen_label(false, ms(at(2024, 5, 2, 11, 59)) + 30_000, now),
            "last seen just now"
        );
        assert_eq!(
            last_seen_label(false, ms(at(2024, 5, 2, 11, 15)), now),
            "last seen 45 minutes ago"
        );
        assert_eq!(
            last_seen_label(false, ms(at(2024, 5, 2, 8, 30)), now),
            "last seen today at 08:30"
        );
        assert_eq!(
            last_seen_label(false, ms(at(2024, 5, 1, 22, 5)), now),
            "last seen yesterday at 22:05"
        );
        assert_eq!(
            last_seen_label(false, ms(at(2024, 2, 14, 9, 0)), now),
            "last seen 14 February 2024"
        );
    }

    #[test]
    fn future_timestamps_read_as_just_now() {
        // Clock skew between writer and reader must not panic or produce
        // negative phrasing.
        let now = at(2024, 5, 2, 12, 0);
        let future = at(2024, 5, 2, 12, 0).timestamp_millis() + 5_000;
        assert_eq!(last_seen_label(false, future, now), "last seen just now");
    }

    #[tokio::test]
    async fn publish_throttles_repeat_online_but_never_offline() {
        let store = spawn_memory_store();
        let mut config = SyncConfig::default();
        config.presence_min_publish = Duration::from_secs(3600);
        let user = UserId::new("alice");
        let mut presence = PresenceManager::new(store.clone(), user.clone(), "Alice", &config);

        presence.publish(true).await;
        assert!(!presence.due(Instant::now()));

        // A second online publish within the window is dropped; the
        // offline edge goes through regardless.
        presence.publish(false).await;

        let mut watch = presence.observe(&user).await.unwrap();
        let view = watch.next().await.unwrap();
        assert!(!view.online);
        assert!(view.last_active > 0);
        assert_eq!(view.display_name, "Alice");
    }

    #[tokio::test]
    async fn observing_an_unknown_user_reads_offline() {
        let store = spawn_memory_store();
        let presence = PresenceManager::new(
            store,
            UserId::new("alice"),
            "Alice",
            &SyncConfig::default(),
        );
        let mut watch = presence.observe(&UserId::new("ghost")).await.unwrap();
        let view = watch.next().await.unwrap();
        assert!(!view.online);
        assert_eq!(view.label_at(at(2024, 5, 2, 12, 0)), "last seen recently");
    }
}
