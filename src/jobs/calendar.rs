//! Calendars: set-membership predicates over instants, used to exclude fire
//! times that would otherwise be due.
//!
//! Follows the pattern `jobs::trigger` uses elsewhere in this crate: a
//! narrow trait plus a handful of concrete variants, built on `chrono`.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc, Weekday};
use std::collections::HashSet;

/// A set-membership predicate on instants, with an optional base calendar
/// chained as a fallback (spec §6: "optional base calendar chained as a
/// fallback").
pub trait Calendar: Send + Sync {
    /// Whether `instant` is included (i.e. NOT excluded) by this calendar.
    fn is_time_included(&self, instant: DateTime<Utc>) -> bool {
        if !self.is_time_excluded(instant) {
            return match self.base_calendar() {
                Some(base) => base.is_time_included(instant),
                None => true,
            };
        }
        false
    }

    /// Whether `instant` is excluded by this calendar specifically (not
    /// counting the base calendar).
    fn is_time_excluded(&self, instant: DateTime<Utc>) -> bool;

    /// The next instant at or after `instant` that is included.
    fn get_next_included_time(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = instant;
        // Bounded search: calendars here exclude at most whole days at a
        // time, so a year of stepping is always enough to find daylight.
        for _ in 0..366 {
            if self.is_time_included(candidate) {
                return candidate;
            }
            candidate += ChronoDuration::days(1);
        }
        candidate
    }

    fn base_calendar(&self) -> Option<&dyn Calendar> {
        None
    }
}

/// Excludes a fixed set of calendar dates (month/day), every year.
#[derive(Debug, Default)]
pub struct AnnualCalendar {
    excluded_month_days: HashSet<(u32, u32)>,
    base: Option<Box<dyn Calendar>>,
}

impl AnnualCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: Box<dyn Calendar>) -> Self {
        Self {
            excluded_month_days: HashSet::new(),
            base: Some(base),
        }
    }

    pub fn exclude_date(&mut self, month: u32, day: u32) {
        self.excluded_month_days.insert((month, day));
    }
}

impl Calendar for AnnualCalendar {
    fn is_time_excluded(&self, instant: DateTime<Utc>) -> bool {
        self.excluded_month_days
            .contains(&(instant.month(), instant.day()))
    }

    fn base_calendar(&self) -> Option<&dyn Calendar> {
        self.base.as_deref()
    }
}

/// Excludes specific days of specific months (non-recurring across years).
#[derive(Debug, Default)]
pub struct MonthlyCalendar {
    excluded_days: HashSet<u32>,
    base: Option<Box<dyn Calendar>>,
}

impl MonthlyCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude_day(&mut self, day: u32) {
        self.excluded_days.insert(day);
    }
}

impl Calendar for MonthlyCalendar {
    fn is_time_excluded(&self, instant: DateTime<Utc>) -> bool {
        self.excluded_days.contains(&instant.day())
    }

    fn base_calendar(&self) -> Option<&dyn Calendar> {
        self.base.as_deref()
    }
}

/// Excludes whole days of the week (e.g. weekends).
#[derive(Debug, Default)]
pub struct WeeklyCalendar {
    excluded_days: HashSet<Weekday>,
    base: Option<Box<dyn Calendar>>,
}

impl WeeklyCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weekends() -> Self {
        let mut cal = Self::new();
        cal.exclude_day(Weekday::Sat);
        cal.exclude_day(Weekday::Sun);
        cal
    }

    pub fn exclude_day(&mut self, day: Weekday) {
        self.excluded_days.insert(day);
    }
}

impl Calendar for WeeklyCalendar {
    fn is_time_excluded(&self, instant: DateTime<Utc>) -> bool {
        self.excluded_days.contains(&instant.weekday())
    }

    fn base_calendar(&self) -> Option<&dyn Calendar> {
        self.base.as_deref()
    }
}

/// Excludes one or more daily time ranges (e.g. nightly maintenance window).
#[derive(Debug, Default)]
pub struct DailyCalendar {
    /// (start seconds-of-day, end seconds-of-day), inclusive.
    excluded_ranges: Vec<(u32, u32)>,
    base: Option<Box<dyn Calendar>>,
}

impl DailyCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude_range(&mut self, start_seconds_of_day: u32, end_seconds_of_day: u32) {
        self.excluded_ranges
            .push((start_seconds_of_day, end_seconds_of_day));
    }
}

impl Calendar for DailyCalendar {
    fn is_time_excluded(&self, instant: DateTime<Utc>) -> bool {
        let sod = instant.num_seconds_from_midnight();
        self.excluded_ranges
            .iter()
            .any(|(start, end)| sod >= *start && sod <= *end)
    }

    fn base_calendar(&self) -> Option<&dyn Calendar> {
        self.base.as_deref()
    }
}

/// Excludes an explicit, unordered set of one-off dates - the classic
/// "holiday calendar".
#[derive(Debug, Default)]
pub struct HolidayCalendar {
    excluded_dates: HashSet<chrono::NaiveDate>,
    base: Option<Box<dyn Calendar>>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_holiday(&mut self, date: chrono::NaiveDate) {
        self.excluded_dates.insert(date);
    }
}

impl Calendar for HolidayCalendar {
    fn is_time_excluded(&self, instant: DateTime<Utc>) -> bool {
        self.excluded_dates.contains(&instant.date_naive())
    }

    fn base_calendar(&self) -> Option<&dyn Calendar> {
        self.base.as_deref()
    }
}

/// Excludes instants matching a cron expression, e.g. "exclude every
/// weekday at noon". Grounded on the same `cron` crate dependency used by
/// `jobs::trigger::cron`.
pub struct CronCalendar {
    schedule: cron::Schedule,
    base: Option<Box<dyn Calendar>>,
}

impl CronCalendar {
    pub fn new(expression: &str) -> Result<Self, cron::error::Error> {
        Ok(Self {
            schedule: expression.parse()?,
            base: None,
        })
    }
}

impl Calendar for CronCalendar {
    fn is_time_excluded(&self, instant: DateTime<Utc>) -> bool {
        // An instant is excluded if the cron schedule's previous fire time
        // lands exactly on it - i.e. the expression matches this instant.
        self.schedule
            .after(&(instant - ChronoDuration::seconds(1)))
            .next()
            .map(|next| next == instant)
            .unwrap_or(false)
    }

    fn base_calendar(&self) -> Option<&dyn Calendar> {
        self.base.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekly_calendar_excludes_weekends() {
        let cal = WeeklyCalendar::weekends();
        let saturday = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2026, 8, 3, 12, 0, 0).unwrap();
        assert!(!cal.is_time_included(saturday));
        assert!(cal.is_time_included(monday));
    }

    #[test]
    fn annual_calendar_excludes_fixed_date_every_year() {
        let mut cal = AnnualCalendar::new();
        cal.exclude_date(12, 25);
        let xmas_2026 = Utc.with_ymd_and_hms(2026, 12, 25, 0, 0, 0).unwrap();
        let xmas_2030 = Utc.with_ymd_and_hms(2030, 12, 25, 0, 0, 0).unwrap();
        assert!(!cal.is_time_included(xmas_2026));
        assert!(!cal.is_time_included(xmas_2030));
    }

    #[test]
    fn base_calendar_chains() {
        let mut weekly = WeeklyCalendar::weekends();
        let mut annual = AnnualCalendar::new();
        annual.exclude_date(1, 1);
        weekly.base = Some(Box::new(annual));

        let new_years_monday = Utc.with_ymd_and_hms(2029, 1, 1, 9, 0, 0).unwrap();
        assert!(!weekly.is_time_included(new_years_monday));
    }

    #[test]
    fn get_next_included_time_skips_excluded_days() {
        let cal = WeeklyCalendar::weekends();
        let saturday = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let next = cal.get_next_included_time(saturday);
        assert!(cal.is_time_included(next));
        assert!(next > saturday);
    }
}
