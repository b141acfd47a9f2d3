use chrono::{DateTime, Duration, Timelike, Utc};

/// Evening window on the clinic's wall clock: 20:00 inclusive to 06:00
/// exclusive. The clinic clock is UTC shifted by a configured whole-hour
/// offset.
pub fn is_evening_hours(now: DateTime<Utc>, clinic_utc_offset_hours: i32) -> bool {
    let local = now + Duration::hours(clinic_utc_offset_hours as i64);
    local.hour() >= 20 || local.hour() < 6
}

/// True when `at` falls between `now` and `now + 24h` inclusive. Past
/// timestamps are never "within" the window.
pub fn within_next_24_hours(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let diff = at - now;
    diff >= Duration::zero() && diff <= Duration::hours(24)
}

pub fn weeks_ago(now: DateTime<Utc>, weeks: i64) -> DateTime<Utc> {
    now - Duration::weeks(weeks)
}

/// Cutoff for stale-grading detection: anything stamped at or before this
/// moment has held the GRADING status too long.
pub fn staleness_cutoff(now: DateTime<Utc>, staleness_hours: i64) -> DateTime<Utc> {
    now - Duration::hours(staleness_hours)
}
