//! Time utilities for hydra

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in fractional seconds, as stored in
/// duration reports.
///
/// Returns 0 if the system clock is set before the Unix epoch.
pub fn current_time_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
