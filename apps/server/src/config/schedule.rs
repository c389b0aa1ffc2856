//! Deadline arithmetic over the session's wall-clock schedule.
//!
//! Deadlines are `HH:MM:SS` times of day at a fixed UTC offset. A new
//! phase's deadline is anchored to the calendar date of the deadline it
//! replaces, not to "now", so a late poke does not drift the schedule:
//! night deadlines fall on the calendar day after the previous
//! deadline, day deadlines on the same day (rolling forward if the
//! time of day has already passed).

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, Time, UtcOffset};

use crate::domain::{Phase, Schedule};
use crate::error::AppError;

const TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");
const OFFSET_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

pub fn parse_time_of_day(raw: &str) -> Result<Time, AppError> {
    Time::parse(raw, TIME_FORMAT)
        .map_err(|e| AppError::config(format!("invalid schedule time {raw:?}: {e}")))
}

pub fn parse_utc_offset(raw: &str) -> Result<UtcOffset, AppError> {
    UtcOffset::parse(raw, OFFSET_FORMAT)
        .map_err(|e| AppError::config(format!("invalid utc offset {raw:?}: {e}")))
}

/// Unix timestamp of the deadline for `entering`, anchored to the
/// previous deadline (or to `now` for the first phase of a session).
pub fn next_deadline(
    schedule: &Schedule,
    entering: Phase,
    previous_end: Option<i64>,
    now: OffsetDateTime,
) -> Result<Option<i64>, AppError> {
    let end_of_day = match entering {
        Phase::Night => parse_time_of_day(&schedule.night_end)?,
        Phase::Day => parse_time_of_day(&schedule.day_end)?,
        Phase::End => return Ok(None),
    };
    let offset = parse_utc_offset(&schedule.utc_offset)?;

    let anchor = previous_end
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        .unwrap_or(now)
        .to_offset(offset);

    let mut candidate = anchor.replace_time(end_of_day);
    if entering == Phase::Night {
        candidate += Duration::days(1);
    }
    // Roll forward past the anchor; the schedule repeats daily.
    while candidate.unix_timestamp() <= anchor.unix_timestamp() {
        candidate += Duration::days(1);
    }

    Ok(Some(candidate.unix_timestamp()))
}

/// A consensus vote shortens the live deadline to the twilight window,
/// never extends it.
pub fn twilight_deadline(schedule: &Schedule, now: OffsetDateTime) -> Option<i64> {
    let shortened = now.unix_timestamp() + schedule.twilight_secs as i64;
    match schedule.phase_end {
        Some(current) => Some(current.min(shortened)),
        None => Some(shortened),
    }
}
