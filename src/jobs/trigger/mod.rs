//! Trigger contract: state, instructions, and the polymorphic `Trigger`
//! trait. Variant arithmetic (simple/cron/calendar-interval/daily-time-
//! interval) lives in the sibling modules.

pub mod calendar_interval;
pub mod cron;
pub mod daily_time_interval;
pub mod simple;

pub use calendar_interval::{CalendarIntervalTrigger, DstPolicy, IntervalUnit};
pub use cron::CronTrigger;
pub use daily_time_interval::DailyTimeIntervalTrigger;
pub use simple::SimpleTrigger;

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::jobs::calendar::Calendar;
use crate::jobs::job::JobContext;
use crate::jobs::key::{JobKey, TriggerKey};

/// Default trigger priority (spec §4.4: "default priority is a well-known
/// constant (5)").
pub const DEFAULT_PRIORITY: i32 = 5;

/// Finite state of a trigger within the store (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerState {
    /// Unknown to the store.
    None,
    /// Armed, waiting for its next fire time.
    Normal,
    /// Suspended by key or group.
    Paused,
    /// A peer trigger of a non-concurrent job is currently executing.
    Blocked,
    /// Both paused and blocked.
    PausedAndBlocked,
    /// Reserved by the scheduler thread for imminent firing.
    Acquired,
    /// No further fires; terminal.
    Complete,
    /// Misbehavior; held for operator attention.
    Error,
}

/// Policy for recovering a trigger whose fire time has already passed by
/// more than the misfire threshold (spec §4.2, §7 GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MisfireInstruction {
    /// Bypass misfire handling entirely for this trigger.
    IgnoreMisfirePolicy,
    /// Fire once, right now, then resume the regular schedule.
    RescheduleNowPreserveCount,
    /// Fire once, right now, dropping any missed repeat count.
    RescheduleNowDropCount,
    /// Do nothing; wait for the next regularly scheduled fire.
    DoNothing,
    /// Put every trigger of this trigger's job into `Error`.
    SetAllJobTriggersError,
}

impl Default for MisfireInstruction {
    fn default() -> Self {
        Self::RescheduleNowDropCount
    }
}

/// Verdict returned by `Trigger::execution_complete`, telling the store what
/// to do with the trigger next (spec §4.4, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionInstruction {
    /// No special action; the trigger continues its normal schedule.
    Noop,
    /// Re-execute the same fire immediately (same fire-instance, refire
    /// count incremented); the store is not touched.
    ReExecuteJob,
    /// Mark just this trigger `Complete`.
    SetTriggerComplete,
    /// Remove this trigger from the store entirely.
    DeleteTrigger,
    /// Mark just this trigger `Error`.
    SetTriggerError,
    /// Mark every trigger of this trigger's job `Complete`.
    SetAllJobTriggersComplete,
    /// Mark every trigger of this trigger's job `Error`.
    SetAllJobTriggersError,
}

/// Polymorphic trigger contract (spec §6). All fire-time computation is
/// pure over the trigger's own configured fields plus an optional excluding
/// calendar; mutation only advances internal bookkeeping (`trigger_fired`,
/// `update_after_misfire`).
pub trait Trigger: Send + Sync + fmt::Debug {
    fn key(&self) -> &TriggerKey;
    fn job_key(&self) -> &JobKey;
    fn start_time(&self) -> DateTime<Utc>;
    fn end_time(&self) -> Option<DateTime<Utc>>;
    fn priority(&self) -> i32;
    fn misfire_instruction(&self) -> MisfireInstruction;
    fn calendar_name(&self) -> Option<&str>;

    fn next_fire_time(&self) -> Option<DateTime<Utc>>;
    fn previous_fire_time(&self) -> Option<DateTime<Utc>>;
    fn final_fire_time(&self) -> Option<DateTime<Utc>>;

    /// Compute and record the first fire time, honoring `calendar`.
    fn compute_first_fire_time(&mut self, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>>;

    /// Pure: the next fire time strictly after `after`, honoring whatever
    /// calendar the caller supplies (may differ from the trigger's stored
    /// one, e.g. during `update_with_new_calendar`).
    fn get_fire_time_after(&self, after: DateTime<Utc>, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>>;

    /// Whether this trigger could still fire again after its current
    /// `next_fire_time`.
    fn may_fire_again(&self) -> bool;

    /// Apply this trigger's misfire instruction, updating its internal
    /// fire-time bookkeeping in place.
    fn update_after_misfire(&mut self, calendar: Option<&dyn Calendar>);

    /// Recompute `next_fire_time` under a newly (re)stored calendar.
    fn update_with_new_calendar(&mut self, calendar: Option<&dyn Calendar>, misfire_threshold: Duration);

    /// Advance internal fire-time bookkeeping after an actual fire:
    /// `previous_fire_time` becomes the old `next_fire_time`, and a new
    /// `next_fire_time` is computed.
    fn trigger_fired(&mut self, calendar: Option<&dyn Calendar>);

    /// Compute the completion instruction after one fire has run (or been
    /// vetoed, in which case `context` is `None`).
    fn execution_complete(
        &mut self,
        context: Option<&JobContext>,
        result: Option<&crate::error::Result<()>>,
    ) -> CompletionInstruction;

    /// Clone this trigger behind a fresh box. The store needs to hand out
    /// independent snapshots (e.g. from `acquire_next_triggers`) while
    /// retaining its own authoritative copy; `dyn Trigger` can't derive
    /// `Clone` directly, so each variant implements this explicitly.
    fn clone_box(&self) -> Box<dyn Trigger>;
}

impl Clone for Box<dyn Trigger> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_priority_is_five() {
        assert_eq!(DEFAULT_PRIORITY, 5);
    }
}
