//! Epoch-millisecond timestamp helpers.
//!
//! Every timestamp in the data model is stored as milliseconds since the Unix
//! epoch (UTC). Calendar questions (which year, which month) are answered here.

use time::{Date, Duration, OffsetDateTime};

pub const MILLIS_PER_DAY: i64 = 86_400_000;

pub fn now_millis() -> i64 {
    to_millis(OffsetDateTime::now_utc())
}

pub fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(timestamp_ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(timestamp_ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn date_of(timestamp_ms: i64) -> Date {
    from_millis(timestamp_ms).date()
}

pub fn year_of(timestamp_ms: i64) -> i32 {
    date_of(timestamp_ms).year()
}

/// Month of the timestamp, 1 through 12.
pub fn month_of(timestamp_ms: i64) -> u8 {
    date_of(timestamp_ms).month() as u8
}

/// `None` when the result is outside the supported calendar range.
pub fn add_days(timestamp_ms: i64, days: i64) -> Option<i64> {
    let offset = Duration::seconds(days.checked_mul(86_400)?);
    from_millis(timestamp_ms).checked_add(offset).map(to_millis)
}

pub fn format_date(timestamp_ms: i64) -> String {
    let d = date_of(timestamp_ms);
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

/// Midnight UTC of the given calendar day, in epoch milliseconds.
pub fn millis_from_ymd(year: i32, month: u8, day: u8) -> Option<i64> {
    let month = time::Month::try_from(month).ok()?;
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(to_millis(date.midnight().assume_utc()))
}
