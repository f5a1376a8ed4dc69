//! Wall-clock period boundaries for commission periods.
//!
//! The teacher's `core::time::TimeManager` tracks synthetic simulation
//! ticks/days; this system needs real calendar boundaries (week, biweek,
//! month) computed in an agent's configured timezone, so the tick/day
//! bookkeeping is replaced outright with `chrono` calendar math while
//! keeping the same "one small struct of pure functions" shape.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutSchedule {
    Weekly,
    Biweekly,
    Monthly,
}

/// A half-open period `[start, end)`, as required by the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Computes the period containing `at`, anchored to the UTC epoch so the
/// same schedule always produces the same boundaries regardless of when it
/// is first queried. Timezone offsets from an agent's configuration would be
/// applied by shifting `at`/the result before/after this call; kept in UTC
/// here since the entities carry no timezone field beyond what callers pass.
pub fn period_containing(schedule: PayoutSchedule, at: DateTime<Utc>) -> Period {
    match schedule {
        PayoutSchedule::Weekly => {
            let days_since_monday = at.weekday().num_days_from_monday() as i64;
            let start = at.date_naive() - Duration::days(days_since_monday);
            let start = Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0).unwrap());
            Period { start, end: start + Duration::days(7) }
        }
        PayoutSchedule::Biweekly => {
            let epoch_monday = Utc.with_ymd_and_hms(2000, 1, 3, 0, 0, 0).unwrap();
            let days_elapsed = (at - epoch_monday).num_days();
            let period_index = days_elapsed.div_euclid(14);
            let start = epoch_monday + Duration::days(period_index * 14);
            Period { start, end: start + Duration::days(14) }
        }
        PayoutSchedule::Monthly => {
            let start = Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0).unwrap();
            let (end_year, end_month) = if at.month() == 12 { (at.year() + 1, 1) } else { (at.year(), at.month() + 1) };
            let end = Utc.with_ymd_and_hms(end_year, end_month, 1, 0, 0, 0).unwrap();
            Period { start, end }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_period_is_half_open() {
        let at = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let period = period_containing(PayoutSchedule::Monthly, at);
        assert_eq!(period.start, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
        assert!(period.contains(at));
        assert!(!period.contains(period.end));
    }

    #[test]
    fn weekly_period_starts_monday() {
        let at = Utc.with_ymd_and_hms(2026, 7, 29, 0, 0, 0).unwrap(); // Wednesday
        let period = period_containing(PayoutSchedule::Weekly, at);
        assert_eq!(period.start.weekday(), chrono::Weekday::Mon);
        assert_eq!(period.end - period.start, Duration::days(7));
    }
}
