use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Holiday calendar collaborator. The ledger excludes weekends itself; this
/// trait only answers whether a weekday is a working day.
pub trait HolidayCalendar: Send + Sync {
    fn is_business_day(&self, date: NaiveDate) -> bool;
}

/// Calendar with no holidays at all; weekends are still excluded by the
/// ledger's own weekday check.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeekendOnlyCalendar;

impl HolidayCalendar for WeekendOnlyCalendar {
    fn is_business_day(&self, _date: NaiveDate) -> bool {
        true
    }
}

#[derive(Clone, Debug, Default)]
pub struct FixedHolidayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl FixedHolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self { holidays: holidays.into_iter().collect() }
    }
}

impl HolidayCalendar for FixedHolidayCalendar {
    fn is_business_day(&self, date: NaiveDate) -> bool {
        !self.holidays.contains(&date)
    }
}

/// Holiday set loaded from an external source, carrying its own expiry so the
/// owner knows when to reload. Passed in by dependency injection; never a
/// process-wide static.
#[derive(Clone, Debug)]
pub struct CachedHolidays {
    calendar: FixedHolidayCalendar,
    loaded_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedHolidays {
    pub fn new(
        holidays: impl IntoIterator<Item = NaiveDate>,
        loaded_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self { calendar: FixedHolidayCalendar::new(holidays), loaded_at, ttl }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.loaded_at >= self.ttl
    }

    pub fn calendar(&self) -> &FixedHolidayCalendar {
        &self.calendar
    }
}

impl HolidayCalendar for CachedHolidays {
    fn is_business_day(&self, date: NaiveDate) -> bool {
        self.calendar.is_business_day(date)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};

    use super::{CachedHolidays, FixedHolidayCalendar, HolidayCalendar, WeekendOnlyCalendar};

    #[test]
    fn fixed_calendar_excludes_listed_holidays() {
        let may_first = NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid date");
        let calendar = FixedHolidayCalendar::new([may_first]);

        assert!(!calendar.is_business_day(may_first));
        assert!(calendar.is_business_day(NaiveDate::from_ymd_opt(2025, 5, 2).expect("valid date")));
        assert!(WeekendOnlyCalendar.is_business_day(may_first));
    }

    #[test]
    fn cached_holidays_report_staleness_after_ttl() {
        let loaded_at = Utc::now();
        let cache = CachedHolidays::new([], loaded_at, Duration::minutes(10));

        assert!(!cache.is_stale(loaded_at + Duration::minutes(9)));
        assert!(cache.is_stale(loaded_at + Duration::minutes(10)));
    }
}
