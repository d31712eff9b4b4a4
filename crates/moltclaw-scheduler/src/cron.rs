//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Field syntax: *, */N, N, N-M, comma lists.
//! Example: "30 9 * * 1-5" = weekdays at 9:30.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

/// Compute the next firing time strictly after `after`, or None for an
/// expression that never matches / fails to parse.
pub fn next_fire(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        tracing::warn!(
            "Invalid cron expression: '{}' (need 5 fields: MIN HOUR DOM MON DOW)",
            expression
        );
        return None;
    }

    let minutes = parse_field(parts[0], 0, 59)?;
    let hours = parse_field(parts[1], 0, 23)?;
    let days = parse_field(parts[2], 1, 31)?;
    let months = parse_field(parts[3], 1, 12)?;
    // Sunday is both 0 and 7 in common cron dialects.
    let mut dows = parse_field(parts[4], 0, 7)?;
    if dows.contains(&7) && !dows.contains(&0) {
        dows.push(0);
    }

    let mut candidate = (after + Duration::minutes(1))
        .with_second(0)
        .unwrap_or(after)
        .with_nanosecond(0)
        .unwrap_or(after);

    // Scan minute-by-minute up to 366 days out; enough for any practical
    // DOM/MON/DOW combination.
    for _ in 0..(366 * 24 * 60) {
        if minutes.contains(&candidate.minute())
            && hours.contains(&candidate.hour())
            && days.contains(&candidate.day())
            && months.contains(&candidate.month())
            && dows.contains(&candidate.weekday().num_days_from_sunday())
        {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }

    None
}

/// Parse a cron field into the set of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    // */N — every N
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    // Comma list: each element is a single value or a range.
    let mut values = Vec::new();
    for element in field.split(',') {
        let element = element.trim();
        if let Some((lo, hi)) = element.split_once('-') {
            let lo: u32 = lo.parse().ok()?;
            let hi: u32 = hi.parse().ok()?;
            if lo > hi || lo < min || hi > max {
                return None;
            }
            values.extend(lo..=hi);
        } else {
            let n: u32 = element.parse().ok()?;
            if n < min || n > max {
                return None;
            }
            values.push(n);
        }
    }

    if values.is_empty() { None } else { Some(values) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_every_hour() {
        let after = Utc.with_ymd_and_hms(2026, 8, 22, 10, 30, 0).unwrap();
        let next = next_fire("0 * * * *", after).unwrap();
        assert_eq!(next.hour(), 11);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_specific_time() {
        let after = Utc.with_ymd_and_hms(2026, 8, 22, 7, 0, 0).unwrap();
        let next = next_fire("0 8 * * *", after).unwrap();
        assert_eq!(next.hour(), 8);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_every_15_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 8, 22, 10, 2, 0).unwrap();
        let next = next_fire("*/15 * * * *", after).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_weekday_range() {
        // 2026-08-22 is a Saturday; "1-5" should skip to Monday the 24th.
        let after = Utc.with_ymd_and_hms(2026, 8, 22, 12, 0, 0).unwrap();
        let next = next_fire("0 9 * * 1-5", after).unwrap();
        assert_eq!(next.day(), 24);
        assert_eq!(next.hour(), 9);
    }

    #[test]
    fn test_sunday_as_seven() {
        let after = Utc.with_ymd_and_hms(2026, 8, 22, 12, 0, 0).unwrap();
        let next = next_fire("0 10 * * 7", after).unwrap();
        assert_eq!(next.weekday().num_days_from_sunday(), 0);
        assert_eq!(next.day(), 23);
    }

    #[test]
    fn test_result_is_strictly_after() {
        let after = Utc.with_ymd_and_hms(2026, 8, 22, 8, 0, 0).unwrap();
        let next = next_fire("0 8 * * *", after).unwrap();
        assert!(next > after);
        assert_eq!(next.day(), 23);
    }

    #[test]
    fn test_invalid_expression() {
        let after = Utc::now();
        assert!(next_fire("bad", after).is_none());
        assert!(next_fire("61 * * * *", after).is_none());
        assert!(next_fire("5-2 * * * *", after).is_none());
    }
}
