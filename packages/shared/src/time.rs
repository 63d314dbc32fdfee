//! Time-related utilities.
//!
//! Everything on the wire is UTC; timestamps are rendered as RFC 3339 with
//! millisecond precision and a `Z` suffix.

use chrono::{DateTime, SecondsFormat, Utc};

/// Get the current time in UTC
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a UTC timestamp to RFC 3339 format (e.g. `2023-01-01T00:00:00.123Z`)
pub fn to_rfc3339(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
