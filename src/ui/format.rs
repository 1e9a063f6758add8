//! Time and duration formatting for terminal output.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Format a timestamp relative to now ("just now", "3 hours ago").
pub fn format_relative_time(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(timestamp).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let units: [(i64, &str); 5] = [
        (60 * 60 * 24 * 365, "year"),
        (60 * 60 * 24 * 30, "month"),
        (60 * 60 * 24, "day"),
        (60 * 60, "hour"),
        (60, "minute"),
    ];

    for (size, unit) in units {
        let count = seconds / size;
        if count >= 1 {
            return if count == 1 {
                format!("1 {} ago", unit)
            } else {
                format!("{} {}s ago", count, unit)
            };
        }
    }

    "just now".to_string()
}

/// Format a duration for display.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{}m{:02}s", d.as_secs() / 60, d.as_secs() % 60)
    }
}

/// Format a signed chrono duration, clamping negatives to zero.
pub fn format_chrono_duration(d: chrono::Duration) -> String {
    format_duration(d.to_std().unwrap_or_default())
}

/// Format a timestamp in local-independent, second precision.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_time_recent_is_just_now() {
        assert_eq!(format_relative_time(Utc::now()), "just now");
        let ts = Utc::now() - chrono::Duration::seconds(30);
        assert_eq!(format_relative_time(ts), "just now");
    }

    #[test]
    fn future_timestamp_is_just_now() {
        let ts = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(format_relative_time(ts), "just now");
    }

    #[test]
    fn relative_time_units() {
        let ago = |d: chrono::Duration| format_relative_time(Utc::now() - d);
        assert_eq!(ago(chrono::Duration::minutes(1)), "1 minute ago");
        assert_eq!(ago(chrono::Duration::minutes(15)), "15 minutes ago");
        assert_eq!(ago(chrono::Duration::hours(5)), "5 hours ago");
        assert_eq!(ago(chrono::Duration::days(1)), "1 day ago");
        assert_eq!(ago(chrono::Duration::days(35)), "1 month ago");
        assert_eq!(ago(chrono::Duration::days(800)), "2 years ago");
    }

    #[test]
    fn duration_formats() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }

    #[test]
    fn negative_chrono_duration_is_zero() {
        assert_eq!(format_chrono_duration(chrono::Duration::seconds(-5)), "0ms");
    }

    #[test]
    fn timestamp_format() {
        let ts = DateTime::from_timestamp(1767268800, 0).unwrap();
        assert_eq!(format_timestamp(ts), "2026-01-01 12:00:00 UTC");
    }
}
