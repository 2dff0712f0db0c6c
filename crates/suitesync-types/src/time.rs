//! Canonical timestamp text format and the epoch sentinel.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Canonical textual timestamp format used for watermarks and row values.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Watermark used when no control row exists, and the fill value for
/// missing timestamp fields.
pub const EPOCH_SENTINEL: &str = "1970-01-01 00:00:00";

/// Accepted layouts for naive timestamps, tried in order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// The epoch sentinel as a timestamp.
#[must_use]
pub fn epoch() -> NaiveDateTime {
    NaiveDateTime::default()
}

/// Render a timestamp in the canonical format. Sub-second precision is dropped.
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Drop sub-second precision so stored and compared values agree with
/// their canonical text.
#[must_use]
pub fn truncate_subsec(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Parse the timestamp shapes produced by the supported backends.
///
/// Accepts the canonical format (optionally with fractional seconds), ISO
/// `T`-separated values, RFC 3339 values with an offset (converted to UTC),
/// PostgreSQL `timestamptz` text (`+00` offsets) and bare dates (midnight).
///
/// # Errors
///
/// Returns a message naming the input when no layout matches.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let trimmed = raw.trim();

    for fmt in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(ts);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }

    // PostgreSQL renders timestamptz as `2024-01-05 10:00:00+00`.
    if let Ok(dt) = DateTime::parse_from_str(&format!("{trimmed}00"), "%Y-%m-%d %H:%M:%S%.f%z") {
        return Ok(dt.naive_utc());
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::default()));
    }

    Err(format!("unrecognized timestamp '{raw}'"))
}
