//! Calendar-interval trigger: steps by a calendar unit (year/month/week/day/
//! hour/minute/second) rather than a fixed duration, with a DST policy for
//! day-or-larger steps.

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};

use super::{CompletionInstruction, MisfireInstruction, Trigger, DEFAULT_PRIORITY};
use crate::jobs::calendar::Calendar;
use crate::jobs::job::JobContext;
use crate::jobs::key::{JobKey, TriggerKey};

/// The calendar unit a `CalendarIntervalTrigger` steps by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// How a day-or-larger step behaves across a daylight-saving transition.
/// UTC has no DST, so this only matters for stores/callers reasoning about
/// a trigger's intended local-time semantics; arithmetic here is always
/// performed in UTC and this policy is carried for contract fidelity with
/// the source scheduler's documented options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DstPolicy {
    #[default]
    FixedInterval,
    PreserveHourOfDay,
}

#[derive(Debug, Clone)]
pub struct CalendarIntervalTrigger {
    key: TriggerKey,
    job_key: JobKey,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    priority: i32,
    misfire_instruction: MisfireInstruction,
    calendar_name: Option<String>,

    unit: IntervalUnit,
    interval: u32,
    dst_policy: DstPolicy,

    next_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
}

impl CalendarIntervalTrigger {
    pub fn new(
        key: TriggerKey,
        job_key: JobKey,
        start_time: DateTime<Utc>,
        unit: IntervalUnit,
        interval: u32,
    ) -> Self {
        Self {
            key,
            job_key,
            start_time,
            end_time: None,
            priority: DEFAULT_PRIORITY,
            misfire_instruction: MisfireInstruction::default(),
            calendar_name: None,
            unit,
            interval: interval.max(1),
            dst_policy: DstPolicy::default(),
            next_fire_time: None,
            previous_fire_time: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dst_policy(mut self, policy: DstPolicy) -> Self {
        self.dst_policy = policy;
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    fn step(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self.unit {
            IntervalUnit::Second => from + Duration::seconds(self.interval as i64),
            IntervalUnit::Minute => from + Duration::minutes(self.interval as i64),
            IntervalUnit::Hour => from + Duration::hours(self.interval as i64),
            IntervalUnit::Day => from + Duration::days(self.interval as i64),
            IntervalUnit::Week => from + Duration::weeks(self.interval as i64),
            IntervalUnit::Month => from
                .checked_add_months(Months::new(self.interval))
                .unwrap_or(from),
            IntervalUnit::Year => {
                let target_year = from.year() + self.interval as i32;
                Utc.with_ymd_and_hms(
                    target_year,
                    from.month(),
                    from.day(),
                    from.hour(),
                    from.minute(),
                    from.second(),
                )
                .single()
                .unwrap_or(from)
            }
        }
    }

    fn within_bounds(&self, candidate: DateTime<Utc>) -> bool {
        self.end_time.map(|end| candidate <= end).unwrap_or(true)
    }

    fn first_after(&self, after: DateTime<Utc>, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        let mut candidate = self.start_time;
        if candidate <= after {
            // Step forward in O(steps) - calendar-interval triggers are
            // expected to be queried close to their current fire time, not
            // arbitrarily far in the past.
            while candidate <= after {
                candidate = self.step(candidate);
            }
        }
        loop {
            if !self.within_bounds(candidate) {
                return None;
            }
            if calendar.map(|c| c.is_time_included(candidate)).unwrap_or(true) {
                return Some(candidate);
            }
            candidate = self.step(candidate);
        }
    }
}

impl Trigger for CalendarIntervalTrigger {
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
                self.next_fire_time = Some(Utc::now());
                let _ = calendar;
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
    use chrono::TimeZone;

    #[test]
    fn steps_by_days() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut t = CalendarIntervalTrigger::new(
            TriggerKey::new("t1"),
            JobKey::new("j1"),
            start,
            IntervalUnit::Day,
            2,
        );
        t.compute_first_fire_time(None);
        assert_eq!(t.next_fire_time(), Some(start));
        t.trigger_fired(None);
        assert_eq!(t.next_fire_time(), Some(start + Duration::days(2)));
    }

    #[test]
    fn steps_by_months_across_year_boundary() {
        let start = Utc.with_ymd_and_hms(2026, 12, 15, 0, 0, 0).unwrap();
        let mut t = CalendarIntervalTrigger::new(
            TriggerKey::new("t1"),
            JobKey::new("j1"),
            start,
            IntervalUnit::Month,
            2,
        );
        t.compute_first_fire_time(None);
        t.trigger_fired(None);
        let next = t.next_fire_time().unwrap();
        assert_eq!(next.year(), 2027);
        assert_eq!(next.month(), 2);
    }

    #[test]
    fn respects_end_time() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut t = CalendarIntervalTrigger::new(
            TriggerKey::new("t1"),
            JobKey::new("j1"),
            start,
            IntervalUnit::Day,
            1,
        )
        .with_end_time(start + Duration::days(1));
        t.compute_first_fire_time(None);
        t.trigger_fired(None);
        assert_eq!(t.next_fire_time(), Some(start + Duration::days(1)));
        t.trigger_fired(None);
        assert_eq!(t.next_fire_time(), None);
    }
}
