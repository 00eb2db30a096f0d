//! Human-readable durations and times.

use chrono::{DateTime, Local};

const MICROSECOND: i64 = 1_000;
const MILLISECOND: i64 = 1_000 * MICROSECOND;
const SECOND: i64 = 1_000 * MILLISECOND;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;

/// Format a duration in nanoseconds with a unit that suits its size.
pub fn format_duration(ns: i64) -> String {
    let d = ns as f64;
    if ns == 0 {
        "0ms".to_string()
    } else if ns < MILLISECOND {
        format!("{}µs", (d * 1e-3).round())
    } else if ns < 10 * SECOND {
        format!("{}ms", (d * 1e-6).round())
    } else if ns < 90 * SECOND {
        format!("{}s", (d * 1e-9).round())
    } else if ns < 90 * MINUTE {
        format!("{} minutes", (d * 1e-9 / 60.0).round())
    } else if ns < 48 * HOUR {
        format!("{} hours", (d * 1e-9 / 3600.0).round())
    } else {
        format!("{} days", (d * 1e-9 / 86400.0).round())
    }
}

/// Like [`format_duration`], but "no data" for a missing value.
pub fn format_opt_duration(ns: Option<i64>) -> String {
    ns.map(format_duration).unwrap_or_else(|| "no data".to_string())
}

/// Coarse elapsed time between two nanosecond timestamps, e.g. "5 minutes".
pub fn time_since(ts: i64, now: i64) -> String {
    let seconds = now.saturating_sub(ts).max(0) / SECOND;

    let units = [
        (31_536_000, "years"),
        (2_592_000, "months"),
        (86_400, "days"),
        (3_600, "hours"),
        (60, "minutes"),
    ];
    for (size, name) in units {
        let interval = seconds / size;
        if interval > 1 {
            return format!("{} {}", interval, name);
        }
    }
    format!("{} seconds", seconds)
}

/// Local wall clock time of a nanosecond timestamp, e.g. "3:07 PM".
pub fn clock_time(ts: i64) -> String {
    let dt: DateTime<Local> = DateTime::from_timestamp_nanos(ts).with_timezone(&Local);
    dt.format("%-I:%M %p").to_string()
}
