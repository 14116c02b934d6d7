//! Reset-window arithmetic.
//!
//! Reset timestamps are anchored: they always sit at `anchor + k * duration`,
//! where the anchor is the first timestamp the limiter ever computed (midnight
//! UTC of the day it started). Catching up after idle periods jumps straight to
//! the right multiple instead of stepping one interval at a time, so the
//! schedule never drifts no matter how late the triggering request arrives.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Midnight UTC of the day containing `now`.
#[must_use]
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Smallest `anchor + k * duration` (k ≥ 0) that is not earlier than `now`.
///
/// `previous` is the last computed reset timestamp; when absent the schedule is
/// anchored at midnight of the current day. A timestamp already in the future
/// is returned unchanged.
///
/// `duration` must be positive.
#[must_use]
pub fn next_reset_timestamp(
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    duration: Duration,
) -> DateTime<Utc> {
    let anchor = previous.unwrap_or_else(|| start_of_day(now));
    if anchor >= now {
        return anchor;
    }

    let duration_ms = duration.num_milliseconds().max(1);
    let elapsed_ms = (now - anchor).num_milliseconds();
    let intervals = (elapsed_ms + duration_ms - 1) / duration_ms;

    let mut next = anchor + Duration::milliseconds(duration_ms * intervals);
    // Millisecond truncation can leave us just short of `now`.
    while next < now {
        next += Duration::milliseconds(duration_ms);
    }
    next
}
