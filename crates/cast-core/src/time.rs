//! Minute/hour boundary math over epoch milliseconds, UTC only.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 3_600_000;

/// Current wall clock in ms since epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Largest minute boundary `<= ts_ms`.
pub fn floor_minute(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(MINUTE_MS)
}

/// Largest hour boundary `<= ts_ms`.
pub fn floor_hour(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(HOUR_MS)
}

pub fn is_minute_boundary(ts_ms: i64) -> bool {
    ts_ms.rem_euclid(MINUTE_MS) == 0
}

fn to_datetime(ts_ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms).expect("timestamp out of chrono range")
}

/// UTC calendar date of an epoch-ms instant.
pub fn utc_date(ts_ms: i64) -> NaiveDate {
    to_datetime(ts_ms).date_naive()
}

/// UTC hour-of-day (0..=23) of an epoch-ms instant.
pub fn utc_hour(ts_ms: i64) -> u32 {
    to_datetime(ts_ms).hour()
}

/// 00:00:00.000 UTC of `date`, in ms since epoch.
pub fn day_start_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
        .timestamp_millis()
}

/// `date` `hour`:00:00.000 UTC in ms since epoch.
pub fn hour_start_ms(date: NaiveDate, hour: u32) -> i64 {
    day_start_ms(date) + i64::from(hour) * HOUR_MS
}

/// Compact `YYYYMMDD` tag used for model artifact names.
pub fn date_tag(date: NaiveDate) -> String {
    format!("{:04}{:02}{:02}", date.year(), date.month(), date.day())
}

/// Parse a `YYYYMMDD` tag back into a date.
pub fn parse_date_tag(tag: &str) -> Option<NaiveDate> {
    if tag.len() != 8 || !tag.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = tag[..4].parse().ok()?;
    let month: u32 = tag[4..6].parse().ok()?;
    let day: u32 = tag[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
