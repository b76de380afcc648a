//! Daily validity window
//!
//! Cached data is refreshed once per business day at `refresh_hour`. The
//! current window starts at the most recent occurrence of that hour: today if
//! the hour has already passed, otherwise yesterday.

use crate::error::{LoaderError, Result};
use chrono::{
    DateTime, Days, Duration as ChronoDuration, FixedOffset, LocalResult, NaiveTime, TimeZone,
};

pub const DEFAULT_REFRESH_HOUR: u8 = 8;

/// Reject hours outside `0..=23`
pub fn validate_refresh_hour(hour: i64) -> Result<u8> {
    if (0..=23).contains(&hour) {
        Ok(hour as u8)
    } else {
        Err(LoaderError::Config(format!(
            "refresh hour must be within 0..=23, got {}",
            hour
        )))
    }
}

/// Start of the window containing `now`.
///
/// The boundary is resolved in `now`'s own time zone, so the previous day's
/// refresh hour carries that day's UTC offset across DST changes. A refresh
/// hour skipped by a spring-forward gap resolves to the first instant after
/// the gap; a repeated hour resolves to its earlier occurrence.
pub fn period_start<Tz: TimeZone>(
    now: &DateTime<Tz>,
    refresh_hour: u8,
) -> DateTime<FixedOffset> {
    let boundary_time =
        NaiveTime::from_hms_opt(u32::from(refresh_hour.min(23)), 0, 0).unwrap_or(NaiveTime::MIN);

    let local = now.naive_local();
    let mut day = local.date();
    if local.time() < boundary_time {
        day = day.checked_sub_days(Days::new(1)).unwrap_or(day);
    }

    let boundary = day.and_time(boundary_time);
    let tz = now.timezone();
    let resolved = match tz.from_local_datetime(&boundary) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(boundary + ChronoDuration::hours(1)))
            .earliest(),
    };
    resolved.unwrap_or_else(|| now.clone()).fixed_offset()
}

/// Millisecond form of [`period_start`]
pub fn period_start_millis<Tz: TimeZone>(now: &DateTime<Tz>, refresh_hour: u8) -> i64 {
    period_start(now, refresh_hour).timestamp_millis()
}

/// Whether a value written at `created_at_ms` is still inside the window.
pub fn is_fresh<Tz: TimeZone>(created_at_ms: i64, now: &DateTime<Tz>, refresh_hour: u8) -> bool {
    created_at_ms >= period_start_millis(now, refresh_hour)
}
