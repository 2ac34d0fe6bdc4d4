/// Application name
pub const APP_NAME: &str = "Courier";

/// Read-side staleness window for typing signals. A stored typing flag older
/// than this is treated as false regardless of its value, because the record
/// may lag the writer's intent.
pub const TYPING_STALENESS_MS: i64 = 10_000;

/// Write-side trailing timer: the local typing flag is cleared after this
/// much keyboard inactivity.
pub const TYPING_IDLE_CLEAR_MS: u64 = 3_000;

/// Minimum interval between repeated "online" presence publishes. The
/// offline edge is never throttled.
pub const PRESENCE_MIN_PUBLISH_SECS: u64 = 30;

/// Number of most-recent messages covered by the active-conversation
/// subscription.
pub const MESSAGE_PAGE_SIZE: usize = 150;

/// Coalescing window between read-receipt batches, so rapid successive
/// snapshot deliveries produce one batch instead of several.
pub const RECEIPT_COALESCE_MS: u64 = 250;
