//! Cron trigger: fires according to a cron expression.
//!
//! Expression parsing and the actual "next occurrence" arithmetic are
//! delegated to the `cron` crate - exactly the kind of pluggable external
//! collaborator spec §1 calls out ("trigger expression parsing... cron"),
//! and the same crate `openwalrus-walrus`'s cron plugin depends on.

use chrono::{DateTime, Duration, Utc};

use super::{CompletionInstruction, MisfireInstruction, Trigger, DEFAULT_PRIORITY};
use crate::jobs::calendar::Calendar;
use crate::jobs::job::JobContext;
use crate::jobs::key::{JobKey, TriggerKey};

#[derive(Debug, Clone)]
pub struct CronTrigger {
    key: TriggerKey,
    job_key: JobKey,
    expression: String,
    schedule: cron::Schedule,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    priority: i32,
    misfire_instruction: MisfireInstruction,
    calendar_name: Option<String>,

    next_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
}

impl CronTrigger {
    pub fn new(
        key: TriggerKey,
        job_key: JobKey,
        expression: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Result<Self, cron::error::Error> {
        let expression = expression.into();
        let schedule: cron::Schedule = expression.parse()?;
        Ok(Self {
            key,
            job_key,
            expression,
            schedule,
            start_time,
            end_time: None,
            priority: DEFAULT_PRIORITY,
            misfire_instruction: MisfireInstruction::default(),
            calendar_name: None,
            next_fire_time: None,
            previous_fire_time: None,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
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

    fn first_candidate_after(&self, after: DateTime<Utc>, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        for candidate in self.schedule.after(&after) {
            if let Some(end) = self.end_time {
                if candidate > end {
                    return None;
                }
            }
            if calendar.map(|c| c.is_time_included(candidate)).unwrap_or(true) {
                return Some(candidate);
            }
        }
        None
    }
}

impl Trigger for CronTrigger {
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
        // A cron schedule has no natural end absent `end_time`.
        None
    }

    fn compute_first_fire_time(&mut self, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        let first = self.first_candidate_after(self.start_time - Duration::seconds(1), calendar);
        self.next_fire_time = first;
        first
    }

    fn get_fire_time_after(&self, after: DateTime<Utc>, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        self.first_candidate_after(after, calendar)
    }

    fn may_fire_again(&self) -> bool {
        self.next_fire_time.is_some()
    }

    fn update_after_misfire(&mut self, calendar: Option<&dyn Calendar>) {
        match self.misfire_instruction {
            MisfireInstruction::IgnoreMisfirePolicy | MisfireInstruction::DoNothing => {}
            MisfireInstruction::RescheduleNowPreserveCount | MisfireInstruction::RescheduleNowDropCount => {
                self.next_fire_time = self.first_candidate_after(Utc::now() - Duration::seconds(1), calendar);
            }
            MisfireInstruction::SetAllJobTriggersError => {}
        }
    }

    fn update_with_new_calendar(&mut self, calendar: Option<&dyn Calendar>, misfire_threshold: Duration) {
        let Some(next) = self.next_fire_time else { return };
        if let Some(cal) = calendar {
            if !cal.is_time_included(next) {
                self.next_fire_time = self.first_candidate_after(next, Some(cal));
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
            .and_then(|nft| self.first_candidate_after(nft, calendar));
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
    fn every_minute_expression_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut t = CronTrigger::new(TriggerKey::new("t1"), JobKey::new("j1"), "0 * * * * *", start).unwrap();
        let first = t.compute_first_fire_time(None).unwrap();
        assert!(first >= start);
        t.trigger_fired(None);
        assert!(t.next_fire_time().unwrap() > first);
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let start = Utc::now();
        let result = CronTrigger::new(TriggerKey::new("t1"), JobKey::new("j1"), "not a cron expr", start);
        assert!(result.is_err());
    }
}
