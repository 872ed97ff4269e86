//! Assigns readings to an overnight session date.
//!
//! A reading belongs to the previous calendar date while the local wall clock
//! is before 12:01 pm, so a whole night of data shares one date even when it
//! straddles midnight. The cutoff is exclusive: 12:00:59 still counts as the
//! previous date, 12:01:00 starts the new one.

use chrono::{DateTime, Duration, NaiveDate, Timelike as _, Utc};
use chrono_tz::Tz;

/// Local wall-clock time of a UTC instant in the configured timezone.
pub fn local_time(timestamp_utc: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    timestamp_utc.with_timezone(&tz)
}

/// The sleep date for a UTC instant. Pure: no clock, no mutable state.
///
/// Stored sleep dates are never recomputed when the configured timezone
/// changes; this function only runs at ingest time.
pub fn sleep_date_for(timestamp_utc: DateTime<Utc>, tz: Tz) -> NaiveDate {
    let local = local_time(timestamp_utc, tz);
    let before_cutoff = local.hour() < 12 || (local.hour() == 12 && local.minute() == 0);
    if before_cutoff {
        local.date_naive() - Duration::days(1)
    } else {
        local.date_naive()
    }
}
