//! Time utilities for runbound

use std::time::Duration;

/// Milliseconds in a duration, saturating at `u64::MAX`.
/// Used for structured log fields.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
