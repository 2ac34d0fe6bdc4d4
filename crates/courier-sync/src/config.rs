//! Synchronization tunables.
//!
//! The defaults match the documented protocol windows; embedders mostly
//! override them in tests to tighten timing.

use std::time::Duration;

use courier_shared::constants::{
    MESSAGE_PAGE_SIZE, PRESENCE_MIN_PUBLISH_SECS, RECEIPT_COALESCE_MS, TYPING_IDLE_CLEAR_MS,
    TYPING_STALENESS_MS,
};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of most-recent messages the active-conversation subscription
    /// covers.
    pub page_size: usize,

    /// Trailing inactivity window after which the local typing flag is
    /// cleared.
    pub typing_idle_clear: Duration,

    /// Read-side staleness window for peers' typing signals, in millis. A
    /// stored flag older than this is treated as false.
    pub typing_staleness_ms: i64,

    /// Minimum interval between repeated "online" presence publishes. The
    /// offline edge is never throttled.
    pub presence_min_publish: Duration,

    /// Coalescing window between read-receipt batches.
    pub receipt_coalesce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: MESSAGE_PAGE_SIZE,
            typing_idle_clear: Duration::from_millis(TYPING_IDLE_CLEAR_MS),
            typing_staleness_ms: TYPING_STALENESS_MS,
            presence_min_publish: Duration::from_secs(PRESENCE_MIN_PUBLISH_SECS),
            receipt_coalesce: Duration::from_millis(RECEIPT_COALESCE_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_windows() {
        let config = SyncConfig::default();
        assert_eq!(config.page_size, 150);
        assert_eq!(config.typing_idle_clear, Duration::from_secs(3));
        assert_eq!(config.typing_staleness_ms, 10_000);
        assert_eq!(config.presence_min_publish, Duration::from_secs(30));
    }
}
