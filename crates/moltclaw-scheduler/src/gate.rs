//! Rate gate — the pure cooldown/daily-cap decision guarding every firing.

use chrono::{DateTime, Duration, Utc};

use crate::schedule::Schedule;

/// Decide whether a firing may proceed.
///
/// `today_count` is the number of terminal, non-skipped activity records for
/// `(account_id, action kind)` in the current UTC day, as reported by the
/// activity log. Both checks are independent; either denies on its own.
/// A firing exactly at `last_run + cooldown_ms` is allowed.
pub fn allow(schedule: &Schedule, today_count: u32, now: DateTime<Utc>) -> bool {
    let Some(limit) = &schedule.rate_limit else {
        return true;
    };

    if let (Some(cooldown_ms), Some(last_run)) = (limit.cooldown_ms, schedule.last_run) {
        let elapsed = now - last_run;
        if elapsed < Duration::milliseconds(cooldown_ms as i64) {
            return false;
        }
    }

    if let Some(max_per_day) = limit.max_per_day
        && today_count >= max_per_day
    {
        return false;
    }

    true
}
