//! Simple trigger: fixed interval, optional repeat count.

use chrono::{DateTime, Duration, Utc};

use super::{CompletionInstruction, MisfireInstruction, Trigger, DEFAULT_PRIORITY};
use crate::jobs::calendar::Calendar;
use crate::jobs::job::JobContext;
use crate::jobs::key::{JobKey, TriggerKey};

/// Repeat forever, rather than a bounded count.
pub const REPEAT_INDEFINITELY: i32 = -1;

#[derive(Debug, Clone)]
pub struct SimpleTrigger {
    key: TriggerKey,
    job_key: JobKey,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    priority: i32,
    misfire_instruction: MisfireInstruction,
    calendar_name: Option<String>,

    repeat_interval: Duration,
    repeat_count: i32,
    times_triggered: i32,

    next_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
}

impl SimpleTrigger {
    pub fn new(
        key: TriggerKey,
        job_key: JobKey,
        start_time: DateTime<Utc>,
        repeat_interval: Duration,
        repeat_count: i32,
    ) -> Self {
        Self {
            key,
            job_key,
            start_time,
            end_time: None,
            priority: DEFAULT_PRIORITY,
            misfire_instruction: MisfireInstruction::default(),
            calendar_name: None,
            repeat_interval,
            repeat_count,
            times_triggered: 0,
            next_fire_time: None,
            previous_fire_time: None,
        }
    }

    /// Fires exactly once, at `start_time`.
    pub fn once(key: TriggerKey, job_key: JobKey, start_time: DateTime<Utc>) -> Self {
        Self::new(key, job_key, start_time, Duration::zero(), 0)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_misfire_instruction(mut self, instruction: MisfireInstruction) -> Self {
        self.misfire_instruction = instruction;
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_calendar_name(mut self, name: impl Into<String>) -> Self {
        self.calendar_name = Some(name.into());
        self
    }

    fn within_bounds(&self, candidate: DateTime<Utc>) -> bool {
        match self.end_time {
            Some(end) => candidate <= end,
            None => true,
        }
    }

    /// Pure computation of the next fire after `times_triggered` repeats
    /// have already occurred, honoring the exclusion calendar.
    fn compute_after(
        &self,
        after: DateTime<Utc>,
        times_triggered: i32,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        if self.repeat_count != REPEAT_INDEFINITELY && times_triggered > self.repeat_count {
            return None;
        }

        let mut candidate = if times_triggered <= 0 {
            self.start_time
        } else {
            self.start_time + self.repeat_interval * times_triggered
        };

        // Skip forward past `after`, and past any calendar exclusions,
        // advancing one repeat-interval at a time. Unbounded interval is
        // guarded by `may_fire_again`/`repeat_count` above for finite
        // triggers; indefinite triggers simply keep stepping, which always
        // terminates because `candidate` is strictly increasing and `after`
        // is fixed.
        let mut step = times_triggered;
        loop {
            if candidate > after
                && calendar.map(|c| c.is_time_included(candidate)).unwrap_or(true)
                && self.within_bounds(candidate)
            {
                return Some(candidate);
            }
            if self.repeat_count != REPEAT_INDEFINITELY && step >= self.repeat_count {
                return None;
            }
            if !self.within_bounds(candidate + self.repeat_interval) && self.repeat_interval > Duration::zero() {
                return None;
            }
            step += 1;
            candidate = self.start_time + self.repeat_interval * step;
        }
    }
}

impl Trigger for SimpleTrigger {
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
        if self.repeat_count == REPEAT_INDEFINITELY {
            return None;
        }
        let last = self.start_time + self.repeat_interval * self.repeat_count;
        if self.within_bounds(last) {
            Some(last)
        } else {
            self.end_time
        }
    }

    fn compute_first_fire_time(&mut self, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        let first = self.compute_after(self.start_time - Duration::milliseconds(1), 0, calendar);
        self.next_fire_time = first;
        first
    }

    fn get_fire_time_after(&self, after: DateTime<Utc>, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        // Determine how many repeats have elapsed by `after`.
        if self.repeat_interval <= Duration::zero() {
            return self.compute_after(after, 0, calendar);
        }
        let elapsed = (after - self.start_time).num_milliseconds()
            / self.repeat_interval.num_milliseconds().max(1);
        let times_triggered = elapsed.max(0) as i32;
        self.compute_after(after, times_triggered, calendar)
    }

    fn may_fire_again(&self) -> bool {
        self.next_fire_time.is_some()
    }

    fn update_after_misfire(&mut self, calendar: Option<&dyn Calendar>) {
        match self.misfire_instruction {
            MisfireInstruction::IgnoreMisfirePolicy | MisfireInstruction::DoNothing => {}
            MisfireInstruction::RescheduleNowPreserveCount | MisfireInstruction::RescheduleNowDropCount => {
                if self.misfire_instruction == MisfireInstruction::RescheduleNowDropCount {
                    self.times_triggered += 1;
                }
                self.next_fire_time = Some(Utc::now());
                let _ = calendar;
            }
            MisfireInstruction::SetAllJobTriggersError => {
                // Handled by the store, which owns the job's peer triggers.
            }
        }
    }

    fn update_with_new_calendar(&mut self, calendar: Option<&dyn Calendar>, misfire_threshold: Duration) {
        let Some(next) = self.next_fire_time else { return };
        if let Some(cal) = calendar {
            if !cal.is_time_included(next) {
                self.next_fire_time = self.get_fire_time_after(next, Some(cal));
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
        self.times_triggered += 1;
        self.next_fire_time = self
            .next_fire_time
            .and_then(|nft| self.compute_after(nft, self.times_triggered, calendar));
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

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn fires_fixed_number_of_times() {
        let mut t = SimpleTrigger::new(
            TriggerKey::new("t1"),
            JobKey::new("j1"),
            base(),
            Duration::seconds(10),
            2,
        );
        let first = t.compute_first_fire_time(None).unwrap();
        assert_eq!(first, base());
        t.trigger_fired(None);
        assert_eq!(t.next_fire_time(), Some(base() + Duration::seconds(10)));
        t.trigger_fired(None);
        assert_eq!(t.next_fire_time(), Some(base() + Duration::seconds(20)));
        t.trigger_fired(None);
        assert_eq!(t.next_fire_time(), None);
        assert!(!t.may_fire_again());
    }

    #[test]
    fn once_fires_a_single_time() {
        let mut t = SimpleTrigger::once(TriggerKey::new("t1"), JobKey::new("j1"), base());
        assert_eq!(t.compute_first_fire_time(None), Some(base()));
        t.trigger_fired(None);
        assert_eq!(t.next_fire_time(), None);
    }

    #[test]
    fn execution_complete_marks_trigger_complete_when_exhausted() {
        let mut t = SimpleTrigger::once(TriggerKey::new("t1"), JobKey::new("j1"), base());
        t.compute_first_fire_time(None);
        t.trigger_fired(None);
        let instruction = t.execution_complete(None, Some(&Ok(())));
        assert_eq!(instruction, CompletionInstruction::SetTriggerComplete);
    }
}
