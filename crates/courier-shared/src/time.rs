//! Epoch-millisecond helpers.
//!
//! Timestamps cross the store boundary as epoch millis (the store stamps
//! them server-side); `chrono` types appear only at the presentation edge
//! where calendar math is needed.

use chrono::{DateTime, Utc};

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

pub fn now_millis() -> Millis {
    Utc::now().timestamp_millis()
}

/// Convert epoch millis to a UTC datetime. Out-of-range values clamp to the
/// epoch rather than panicking.
pub fn to_datetime(ms: Millis) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
