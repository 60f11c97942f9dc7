//! Daily-time-interval trigger: fires repeatedly within a daily time window,
//! on specified days of the week.

use chrono::{DateTime, Duration, NaiveTime, Utc, Weekday};

use super::{CompletionInstruction, MisfireInstruction, Trigger, DEFAULT_PRIORITY};
use crate::jobs::calendar::Calendar;
use crate::jobs::job::JobContext;
use crate::jobs::key::{JobKey, TriggerKey};

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone)]
pub struct DailyTimeIntervalTrigger {
    key: TriggerKey,
    job_key: JobKey,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    priority: i32,
    misfire_instruction: MisfireInstruction,
    calendar_name: Option<String>,

    start_time_of_day: NaiveTime,
    end_time_of_day: NaiveTime,
    repeat_interval: Duration,
    days_of_week: Vec<Weekday>,

    next_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
}

impl DailyTimeIntervalTrigger {
    pub fn new(
        key: TriggerKey,
        job_key: JobKey,
        start_time: DateTime<Utc>,
        start_time_of_day: NaiveTime,
        end_time_of_day: NaiveTime,
        repeat_interval: Duration,
    ) -> Self {
        Self {
            key,
            job_key,
            start_time,
            end_time: None,
            priority: DEFAULT_PRIORITY,
            misfire_instruction: MisfireInstruction::default(),
            calendar_name: None,
            start_time_of_day,
            end_time_of_day,
            repeat_interval,
            days_of_week: ALL_DAYS.to_vec(),
            next_fire_time: None,
            previous_fire_time: None,
        }
    }

    pub fn with_days_of_week(mut self, days: Vec<Weekday>) -> Self {
        self.days_of_week = days;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    fn within_bounds(&self, candidate: DateTime<Utc>) -> bool {
        candidate >= self.start_time && self.end_time.map(|e| candidate <= e).unwrap_or(true)
    }

    fn day_window_start(&self, date: chrono::NaiveDate) -> DateTime<Utc> {
        DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(self.start_time_of_day), Utc)
    }

    fn day_window_end(&self, date: chrono::NaiveDate) -> DateTime<Utc> {
        DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(self.end_time_of_day), Utc)
    }

    fn first_after(&self, after: DateTime<Utc>, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        let mut date = after.date_naive();
        // Bounded: scan at most a year of days looking for an armed weekday
        // with remaining window time.
        for _ in 0..366 {
            if self.days_of_week.contains(&date.weekday()) {
                let window_start = self.day_window_start(date);
                let window_end = self.day_window_end(date);
                let mut candidate = if after < window_start {
                    window_start
                } else {
                    // Step forward by repeat_interval from window_start
                    // until strictly after `after`.
                    let mut c = window_start;
                    while c <= after {
                        c += self.repeat_interval;
                    }
                    c
                };
                while candidate <= window_end {
                    if self.within_bounds(candidate)
                        && calendar.map(|c| c.is_time_included(candidate)).unwrap_or(true)
                    {
                        return Some(candidate);
                    }
                    candidate += self.repeat_interval;
                }
            }
            date = date.succ_opt()?;
            if let Some(end) = self.end_time {
                if self.day_window_start(date) > end {
                    return None;
                }
            }
        }
        None
    }
}

impl Trigger for DailyTimeIntervalTrigger {
    fn key(&self) -> &TriggerKey {
        &self.key
    }

    fn job_key(&self) -> &JobKey {
        &self.job_key
    }

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn misfire_instruction(&self) -> MisfireInstruction {
        self.misfire_instruction
    }

    fn calendar_name(&self) -> Option<&str> {
        self.calendar_name.as_deref()
    }

    fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_time
    }

    fn previous_fire_time(&self) -> Option<DateTime<Utc>> {
        self.previous_fire_time
    }

    fn final_fire_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    fn compute_first_fire_time(&mut self, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        let first = self.first_after(self.start_time - Duration::milliseconds(1), calendar);
        self.next_fire_time = first;
        first
    }

    fn get_fire_time_after(&self, after: DateTime<Utc>, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        self.first_after(after, calendar)
    }

    fn may_fire_again(&self) -> bool {
        self.next_fire_time.is_some()
    }

    fn update_after_misfire(&mut self, calendar: Option<&dyn Calendar>) {
        match self.misfire_instruction {
            MisfireInstruction::IgnoreMisfirePolicy | MisfireInstruction::DoNothing => {}
            MisfireInstruction::RescheduleNowPreserveCount | MisfireInstruction::RescheduleNowDropCount => {
                self.next_fire_time = self.first_after(Utc::now() - Duration::milliseconds(1), calendar);
            }
            MisfireInstruction::SetAllJobTriggersError => {}
        }
    }

    fn update_with_new_calendar(&mut self, calendar: Option<&dyn Calendar>, misfire_threshold: Duration) {
        let Some(next) = self.next_fire_time else { return };
        if let Some(cal) = calendar {
            if !cal.is_time_included(next) {
                self.next_fire_time = self.first_after(next, Some(cal));
            }
        }
        if let Some(new_next) = self.next_fire_time {
            if new_next < Utc::now() - misfire_threshold {
                self.update_after_misfire(calendar);
            }
        }
    }

    fn trigger_fired(&mut self, calendar: Option<&dyn Calendar>) {
        self.previous_fire_time = self.next_fire_time;
        self.next_fire_time = self
            .next_fire_time
            .and_then(|nft| self.first_after(nft, calendar));
    }

    fn execution_complete(
        &mut self,
        _context: Option<&JobContext>,
        result: Option<&crate::error::Result<()>>,
    ) -> CompletionInstruction {
        if matches!(result, Some(Err(_))) && self.misfire_instruction == MisfireInstruction::SetAllJobTriggersError {
            return CompletionInstruction::SetAllJobTriggersError;
        }
        if self.next_fire_time.is_none() {
            CompletionInstruction::SetTriggerComplete
        } else {
            CompletionInstruction::Noop
        }
    }

    fn clone_box(&self) -> Box<dyn Trigger> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn fires_within_daily_window_on_weekdays() {
        let start = Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap(); // Monday
        let mut t = DailyTimeIntervalTrigger::new(
            TriggerKey::new("t1"),
            JobKey::new("j1"),
            start,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            Duration::hours(4),
        )
        .with_days_of_week(vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]);

        let first = t.compute_first_fire_time(None).unwrap();
        assert_eq!(first.time(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        t.trigger_fired(None);
        let second = t.next_fire_time().unwrap();
        assert_eq!(second.time(), NaiveTime::from_hms_opt(13, 0, 0).unwrap());
    }

    #[test]
    fn skips_weekends() {
        let start = Utc.with_ymd_and_hms(2026, 8, 7, 16, 0, 0).unwrap(); // Friday afternoon
        let mut t = DailyTimeIntervalTrigger::new(
            TriggerKey::new("t1"),
            JobKey::new("j1"),
            start,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            Duration::hours(4),
        )
        .with_days_of_week(vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]);

        t.compute_first_fire_time(None);
        t.trigger_fired(None); // consumes the Friday 16:00 slot; steps to next
        let next = t.next_fire_time().unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
    }
}
