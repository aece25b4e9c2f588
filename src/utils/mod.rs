//! Shared utility functions
//!
//! Human-readable formatting used by the recovery listing.

use chrono::{Local, TimeZone};

/// Format a byte size as human-readable string
///
/// Examples: "1.2 MB", "450.0 KB", "23.0 B", "0 B"
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut group = 0;
    while value >= 1024.0 && group < UNITS.len() - 1 {
        value /= 1024.0;
        group += 1;
    }

    format!("{:.1} {}", value, UNITS[group])
}

/// Format a millisecond epoch timestamp as a local date, e.g. "Jan 05, 2024"
pub fn format_date(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(dt) => dt.format("%b %d, %Y").to_string(),
        None => String::new(),
    }
}
