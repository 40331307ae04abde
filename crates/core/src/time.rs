//! Wall-clock helpers shared across the fabric.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
