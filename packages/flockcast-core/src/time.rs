//! Local clock utilities.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current local time in microseconds since the Unix epoch.
///
/// Returns 0 if the system clock is before the epoch (shouldn't happen in
/// practice). Every offset estimate and reference-time computation in this
/// crate is expressed in this unit.
#[must_use]
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
