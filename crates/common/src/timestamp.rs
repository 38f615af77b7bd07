//! Timestamp utilities.
//!
//! Report datetimes travel on the wire as floating-point seconds since
//! 1970-01-01T00:00:00Z with microsecond precision.

use chrono::{DateTime, NaiveDateTime, TimeZone};

/// Seconds since the Unix epoch for a datetime carrying an offset.
///
/// The value is normalized to UTC first, so the offset never changes the
/// instant that is encoded.
pub fn epoch_seconds<Tz: TimeZone>(dt: &DateTime<Tz>) -> f64 {
    to_float(dt.timestamp(), dt.timestamp_subsec_micros())
}

/// Seconds since the Unix epoch for a datetime without an offset, read as UTC.
pub fn naive_epoch_seconds(dt: &NaiveDateTime) -> f64 {
    epoch_seconds(&dt.and_utc())
}

fn to_float(secs: i64, micros: u32) -> f64 {
    // Leap-second representations carry micros >= 1_000_000.
    secs as f64 + f64::from(micros) / 1_000_000.0
}
