use chrono::{DateTime, Local, NaiveDate, NaiveTime};

/// Layout users type dates in. Day and month may omit the leading zero.
pub const DATE_LAYOUT: &str = "%d-%m-%Y";
pub const TIME_LAYOUT: &str = "%H:%M";
pub const FULL_LAYOUT: &str = "%H:%M %d-%m-%Y";

/// Shown to users as an example of [`DATE_LAYOUT`].
pub const DATE_EXAMPLE: &str = "24-12-2025";

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub fn parse_date(input: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(input.trim(), DATE_LAYOUT)
}

/// Unix start and end of `date`, midnight to midnight UTC.
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    (start, start + SECONDS_PER_DAY)
}

/// Formats a unix timestamp in local time. Out of range timestamps render as
/// the raw number.
pub fn format_timestamp(timestamp: i64, layout: &str) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(utc) => utc.with_timezone(&Local).format(layout).to_string(),
        None => timestamp.to_string(),
    }
}
