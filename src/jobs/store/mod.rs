//! `JobStore`: the authoritative collection of jobs, triggers, and calendars
//! (spec §4.2). This module holds the trait contract; `memory` ships the
//! in-memory implementation this crate runs with out of the box.

pub mod memory;

pub use memory::InMemoryJobStore;

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::jobs::calendar::Calendar;
use crate::jobs::job::JobDetail;
use crate::jobs::key::{JobKey, Matcher, TriggerKey};
use crate::jobs::signaler::SchedulerSignaler;
use crate::jobs::trigger::{CompletionInstruction, Trigger, TriggerState};
use std::sync::Arc;

/// Everything a `JobRunShell` needs to run one fire: the job detail, the
/// trigger snapshot at fire time, and the fire-time bookkeeping (spec §4.2).
pub struct TriggerFiredBundle {
    pub trigger: Box<dyn Trigger>,
    pub job_detail: JobDetail,
    pub fire_instance_id: String,
    pub fire_time: DateTime<Utc>,
    pub scheduled_fire_time: DateTime<Utc>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
}

/// The store contract (spec §4.2, §6). All operations are blocking and
/// thread-safe; implementations mediate every mutation through their own
/// internal lock(s) (spec §5: "the JobStore owns all trigger/job state and
/// mediates all mutation through its own mutex(es)").
pub trait JobStore: Send + Sync {
    /// Wire up the signaler the store uses to wake the scheduler thread and
    /// notify listeners (spec §6: "an `initialize(classLoadHelper,
    /// signaler)` hook"). Class-load-helper has no Rust analogue and is
    /// dropped; the signaler is the only collaborator the store needs.
    fn initialize(&self, signaler: Arc<dyn SchedulerSignaler>);

    fn scheduler_started(&self) -> Result<()>;
    fn scheduler_paused(&self);
    fn scheduler_resumed(&self);

    fn store_job_and_trigger(&self, job: JobDetail, trigger: Box<dyn Trigger>) -> Result<()>;

    /// Store a job with no trigger attached. Fails unless the job is
    /// durable or `allow_non_durable` is set (spec: a non-durable,
    /// trigger-less job has no way to ever fire).
    fn store_job(&self, job: JobDetail, replace: bool, allow_non_durable: bool) -> Result<()>;
    fn store_trigger(&self, trigger: Box<dyn Trigger>, replace: bool) -> Result<()>;
    fn remove_job(&self, key: &JobKey) -> Result<bool>;
    fn remove_trigger(&self, key: &TriggerKey) -> Result<bool>;
    fn replace_trigger(&self, key: &TriggerKey, new_trigger: Box<dyn Trigger>) -> Result<bool>;

    fn pause_trigger(&self, key: &TriggerKey) -> Result<()>;
    fn pause_job(&self, key: &JobKey) -> Result<()>;
    fn pause_triggers(&self, matcher: &dyn Matcher<TriggerKey>) -> Result<Vec<String>>;
    fn pause_jobs(&self, matcher: &dyn Matcher<JobKey>) -> Result<Vec<String>>;
    fn resume_trigger(&self, key: &TriggerKey) -> Result<()>;
    fn resume_job(&self, key: &JobKey) -> Result<()>;
    fn resume_triggers(&self, matcher: &dyn Matcher<TriggerKey>) -> Result<Vec<String>>;
    fn resume_jobs(&self, matcher: &dyn Matcher<JobKey>) -> Result<Vec<String>>;
    fn pause_all(&self);
    fn resume_all(&self);

    fn get_trigger_state(&self, key: &TriggerKey) -> TriggerState;
    fn clear_all_scheduling_data(&self);
    fn store_calendar(
        &self,
        name: &str,
        calendar: Arc<dyn Calendar>,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()>;

    /// Look up a stored calendar by name, e.g. to honor it while computing a
    /// trigger's first fire time before the trigger itself is stored.
    fn get_calendar(&self, name: &str) -> Option<Arc<dyn Calendar>>;

    /// Ordered batch acquisition (spec §4.2/§8). Ordering key: `(next_fire_time
    /// asc, priority desc, group+name asc)`.
    fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: Duration,
    ) -> Result<Vec<Box<dyn Trigger>>>;

    fn release_acquired_trigger(&self, trigger_key: &TriggerKey);

    /// For each acquired trigger, atomically advance its fire-time
    /// bookkeeping and produce a bundle, or `None` if the trigger vanished,
    /// was paused, or has no next fire (spec §4.2).
    fn triggers_fired(&self, trigger_keys: &[TriggerKey]) -> Vec<Option<TriggerFiredBundle>>;

    fn triggered_job_complete(&self, trigger_key: &TriggerKey, instruction: CompletionInstruction);

    /// Explicit misfire sweep over every stored trigger, independent of
    /// acquisition (Open Question resolution: both paths are supported).
    /// Returns the number of triggers misfired.
    fn scan_misfires(&self) -> usize;

    fn job_exists(&self, key: &JobKey) -> bool;
    fn trigger_exists(&self, key: &TriggerKey) -> bool;
    fn get_job_detail(&self, key: &JobKey) -> Option<JobDetail>;
    fn get_trigger_keys_for_job(&self, key: &JobKey) -> Vec<TriggerKey>;
}
