//! Timestamp conversion kernels
//!
//! Timestamps are microseconds since the Unix epoch, UTC. Dates and
//! datetimes are wall-clock values interpreted in the given zone. Results
//! outside the timestamp range become null, as do unparsable strings.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use super::Column;

/// Largest valid timestamp: 9999-12-31 23:59:59.999999 UTC.
pub const MAX_TIMESTAMP: i64 = 253_402_300_799_999_999;

/// Valid timestamps lie strictly after the epoch and no later than
/// `MAX_TIMESTAMP`.
pub fn is_valid_timestamp(micros: i64) -> bool {
    micros > 0 && micros <= MAX_TIMESTAMP
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%d%H%M%S",
];

fn local_to_timestamp(zone: &FixedOffset, local: &NaiveDateTime) -> Option<i64> {
    let micros = zone
        .from_local_datetime(local)
        .single()?
        .timestamp_micros();
    is_valid_timestamp(micros).then_some(micros)
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Midnight of each date in `zone`.
pub fn date_to_timestamp(zone: &FixedOffset, dates: &Column<NaiveDate>) -> Column<i64> {
    dates.map(|d| local_to_timestamp(zone, &d.and_time(NaiveTime::MIN)))
}

pub fn datetime_to_timestamp(zone: &FixedOffset, datetimes: &Column<NaiveDateTime>) -> Column<i64> {
    datetimes.map(|dt| local_to_timestamp(zone, dt))
}

/// Parses `YYYY-MM-DD[ HH:MM:SS[.ffffff]]` strings as wall time in `zone`.
pub fn date_string_to_timestamp(zone: &FixedOffset, strings: &Column<String>) -> Column<i64> {
    strings.map(|s| local_to_timestamp(zone, &parse_datetime(s)?))
}
