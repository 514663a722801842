//! Trading-date resolution.
//!
//! A capture taken before the session opens, or on a weekend, belongs to the
//! most recent weekday before it. Holidays are not modelled.

use chrono::{Datelike, Days, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};

use crate::models::DATE_FORMAT;
use tracing::warn;

pub const DEFAULT_OPENING_HOUR: u32 = 9;

/// Largest offset `FixedOffset` accepts, just under a day.
pub const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

fn is_weekday(d: NaiveDate) -> bool {
    !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Calendar date a snapshot taken at `now` is attributed to.
pub fn trading_date(now: NaiveDateTime, opening_hour: u32) -> NaiveDate {
    let today = now.date();
    let opening = NaiveTime::from_hms_opt(opening_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);

    if now.time() >= opening && is_weekday(today) {
        return today;
    }

    let mut d = today;
    loop {
        d = match d.checked_sub_days(Days::new(1)) {
            Some(prev) => prev,
            None => return today,
        };
        if is_weekday(d) {
            return d;
        }
    }
}

/// `trading_date` rendered as `DD/MM/YYYY`.
pub fn trading_date_label(now: NaiveDateTime, opening_hour: u32) -> String {
    trading_date(now, opening_hour).format(DATE_FORMAT).to_string()
}

/// Wall-clock now, either in a fixed offset or the host's local zone.
///
/// An offset outside `±MAX_OFFSET_MINUTES` is rejected by config validation;
/// if one still gets here it falls back to local time with a warning.
pub fn wall_clock(utc_offset_minutes: Option<i32>) -> NaiveDateTime {
    let Some(minutes) = utc_offset_minutes else {
        return Local::now().naive_local();
    };
    match minutes.checked_mul(60).and_then(FixedOffset::east_opt) {
        Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
        None => {
            warn!("UTC offset of {} minutes is out of range, using local time", minutes);
            Local::now().naive_local()
        }
    }
}
