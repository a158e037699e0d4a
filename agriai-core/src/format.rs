//! Formatting helpers shared across front ends.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Time left before an entry created at `timestamp` expires, zero once it has.
pub fn expires_in(timestamp: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> Duration {
    let age_ms = now.signed_duration_since(timestamp).num_milliseconds();
    let ttl_ms = ttl.as_millis() as i128;
    let remaining = (ttl_ms - i128::from(age_ms)).clamp(0, u64::MAX as i128);
    Duration::from_millis(remaining as u64)
}

/// Format a countdown as `m:ss` (e.g. "1:05"), rounding partial seconds down.
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Format a timestamp relative to `now` (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 5 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else {
        ts.format("%b %d").to_string()
    }
}
