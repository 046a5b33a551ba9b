use chrono::{DateTime, SecondsFormat, Utc};

/// Nanosecond timestamp, counted from the unix epoch
pub type Timestamp = i64;

pub const NANOS_PER_MICRO: i64 = 1_000;
pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;
pub const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
pub const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
pub const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;
pub const NANOS_PER_WEEK: i64 = 7 * NANOS_PER_DAY;
pub const NANOS_PER_YEAR: i64 = 365 * NANOS_PER_DAY;

/// Converts a nanosecond UTC timestamp into a DateTime structure
pub fn timestamp_to_datetime(ts: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ts)
}

/// Returns `None` when the instant does not fit in an i64 nanosecond count
/// (roughly before 1677 or after 2262).
pub fn datetime_to_timestamp(dt: &DateTime<Utc>) -> Option<Timestamp> {
    dt.timestamp_nanos_opt()
}

/// Renders a timestamp as RFC 3339, used in error and log messages.
pub fn format_timestamp(ts: Timestamp) -> String {
    timestamp_to_datetime(ts).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
