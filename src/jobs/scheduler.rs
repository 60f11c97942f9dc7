//! `Scheduler`: the public facade tying store, worker pool, scheduler
//! thread, and listener bus together (spec §4.8). Construct once, then
//! schedule/reschedule/pause/interrupt/shut down through this one handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::jobs::job::{JobDetail, JobFactory, SimpleJobFactory};
use crate::jobs::key::{JobKey, Matcher, TriggerKey, DEFAULT_GROUP};
use crate::jobs::listeners::{JobListener, ListenerManager, SchedulerListener, TriggerListener};
use crate::jobs::run_shell::ExecutingJobsRegistry;
use crate::jobs::scheduler_thread::SchedulerThread;
use crate::jobs::signaler::{ChannelSignaler, SchedulerSignaler};
use crate::jobs::store::JobStore;
use crate::jobs::trigger::simple::SimpleTrigger;
use crate::jobs::trigger::{Trigger, TriggerState};
use crate::jobs::worker_pool::WorkerPool;

/// Outcome of `reschedule_trigger`, distinguishing "no such trigger" from
/// "rescheduled, and here's its new first fire time" (spec §4.8:
/// "`rescheduleJob` returns null if the prior trigger is absent").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleOutcome {
    NotFound,
    Rescheduled(Option<DateTime<Utc>>),
}

pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn JobStore>,
    pool: Arc<WorkerPool>,
    listeners: Arc<ListenerManager>,
    registry: Arc<ExecutingJobsRegistry>,
    paused: Arc<AtomicBool>,
    resume_notify: Arc<Notify>,
    signal_notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    started: AtomicBool,
    thread: Arc<SchedulerThread>,
    thread_handle: SyncMutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, store: Arc<dyn JobStore>) -> Self {
        let (signaler, signal_rx, signal_notify) = ChannelSignaler::new();
        let signaler: Arc<dyn SchedulerSignaler> = Arc::new(signaler);
        store.initialize(Arc::clone(&signaler));

        let pool = Arc::new(WorkerPool::new(config.scheduler_name.clone(), &config.thread_pool));
        let listeners = Arc::new(ListenerManager::new());
        let job_factory: Arc<dyn JobFactory> = Arc::new(SimpleJobFactory);
        let registry = Arc::new(ExecutingJobsRegistry::new());
        let paused = Arc::new(AtomicBool::new(false));
        let resume_notify = Arc::new(Notify::new());
        let shutting_down = Arc::new(AtomicBool::new(false));

        let idle_wait_time = to_chrono(config.idle_wait_time);
        let misfire_threshold = to_chrono(config.misfire_threshold);
        let batch_time_window = to_chrono(config.batch_time_window);

        let thread = Arc::new(SchedulerThread::new(
            Arc::clone(&store),
            Arc::clone(&pool),
            Arc::clone(&listeners),
            job_factory,
            Arc::clone(&registry),
            signal_rx,
            Arc::clone(&signal_notify),
            Arc::clone(&paused),
            Arc::clone(&resume_notify),
            Arc::clone(&shutting_down),
            idle_wait_time,
            misfire_threshold,
            config.max_batch_size,
            batch_time_window,
        ));

        Self {
            config,
            store,
            pool,
            listeners,
            registry,
            paused,
            resume_notify,
            signal_notify,
            shutting_down,
            started: AtomicBool::new(false),
            thread,
            thread_handle: SyncMutex::new(None),
        }
    }

    fn ensure_not_shutdown(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(SchedulerError::scheduler("scheduler has been shut down"));
        }
        Ok(())
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    pub async fn start(&self) -> Result<()> {
        self.ensure_not_shutdown()?;
        let was_paused = self.paused.swap(false, Ordering::AcqRel);
        self.resume_notify.notify_waiters();

        if self.started.swap(true, Ordering::AcqRel) {
            if was_paused {
                self.store.scheduler_resumed();
                self.listeners.notify_scheduler_resumed().await;
            }
            return Ok(());
        }

        self.store.scheduler_started()?;
        let handle = Arc::clone(&self.thread).spawn();
        *self.thread_handle.lock() = Some(handle);
        self.listeners.notify_scheduler_started().await;
        Ok(())
    }

    /// Start after waiting `seconds`, for callers that want the scheduler
    /// quiescent for a warm-up window before it begins firing (spec §4.8:
    /// "`startDelayed(seconds)`").
    pub async fn start_delayed(&self, seconds: u64) -> Result<()> {
        tokio::time::sleep(StdDuration::from_secs(seconds)).await;
        self.start().await
    }

    pub async fn standby(&self) {
        self.paused.store(true, Ordering::Release);
        self.store.scheduler_paused();
        self.listeners.notify_scheduler_paused().await;
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_in_standby(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub async fn shutdown(&self, wait_for_jobs_to_complete: bool) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.config.interrupt_jobs_on_shutdown {
            for entry in self.registry.iter() {
                entry.request_interrupt();
            }
        }

        self.resume_notify.notify_waiters();
        self.signal_notify.notify_waiters();
        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.await;
        }

        let wait = wait_for_jobs_to_complete || self.config.interrupt_jobs_on_shutdown_with_wait;
        self.pool.shutdown(wait).await;
        self.listeners.notify_scheduler_shutdown().await;
    }

    // ── Job & trigger CRUD ────────────────────────────────────────────

    /// Store a new job together with its first trigger (spec §4.8,
    /// `scheduleJob(job, trigger)`). Returns the trigger's first fire time.
    pub fn schedule_job(&self, job: JobDetail, mut trigger: Box<dyn Trigger>) -> Result<Option<DateTime<Utc>>> {
        self.ensure_not_shutdown()?;
        let first = self.compute_first_fire(trigger.as_mut())?;
        self.store.store_job_and_trigger(job, trigger)?;
        Ok(first)
    }

    /// Attach a new trigger to an already-stored, durable job.
    pub fn schedule_trigger(&self, mut trigger: Box<dyn Trigger>) -> Result<Option<DateTime<Utc>>> {
        self.ensure_not_shutdown()?;
        if !self.store.job_exists(trigger.job_key()) {
            return Err(SchedulerError::not_found("job", trigger.job_key().to_string()));
        }
        let first = self.compute_first_fire(trigger.as_mut())?;
        self.store.store_trigger(trigger, false)?;
        Ok(first)
    }

    fn compute_first_fire(&self, trigger: &mut dyn Trigger) -> Result<Option<DateTime<Utc>>> {
        let calendar = trigger.calendar_name().and_then(|name| self.store.get_calendar(name));
        let first = trigger.compute_first_fire_time(calendar.as_deref());
        if first.is_none() {
            return Err(SchedulerError::scheduler(format!(
                "trigger '{}' will never fire with its configured schedule",
                trigger.key()
            )));
        }
        Ok(first)
    }

    pub fn add_job(&self, job: JobDetail, replace: bool, allow_non_durable: bool) -> Result<()> {
        self.ensure_not_shutdown()?;
        self.store.store_job(job, replace, allow_non_durable)
    }

    pub async fn delete_job(&self, key: &JobKey) -> Result<bool> {
        self.ensure_not_shutdown()?;
        let removed = self.store.remove_job(key)?;
        if removed {
            self.listeners.notify_job_deleted(key).await;
        }
        Ok(removed)
    }

    pub fn unschedule_trigger(&self, key: &TriggerKey) -> Result<bool> {
        self.ensure_not_shutdown()?;
        self.store.remove_trigger(key)
    }

    /// Swap a trigger for a new one under a possibly different key, keeping
    /// the same job (spec §4.8, `rescheduleJob`).
    pub fn reschedule_trigger(&self, key: &TriggerKey, mut new_trigger: Box<dyn Trigger>) -> Result<RescheduleOutcome> {
        self.ensure_not_shutdown()?;
        if !self.store.trigger_exists(key) {
            return Ok(RescheduleOutcome::NotFound);
        }
        let first = self.compute_first_fire(new_trigger.as_mut())?;
        if !self.store.replace_trigger(key, new_trigger)? {
            return Ok(RescheduleOutcome::NotFound);
        }
        Ok(RescheduleOutcome::Rescheduled(first))
    }

    /// Fire a job immediately, outside its regular schedule, via an
    /// ephemeral non-durable trigger (spec §4.8, `triggerJob`). Per-fire
    /// data overrides aren't modeled: triggers here carry no data map of
    /// their own, only the job's.
    pub fn trigger_job(&self, job_key: &JobKey) -> Result<()> {
        self.ensure_not_shutdown()?;
        if !self.store.job_exists(job_key) {
            return Err(SchedulerError::not_found("job", job_key.to_string()));
        }

        let mut trigger_key = ephemeral_trigger_key();
        while self.store.trigger_exists(&trigger_key) {
            trigger_key = ephemeral_trigger_key();
        }
        let mut trigger = SimpleTrigger::once(trigger_key, job_key.clone(), Utc::now());
        trigger.compute_first_fire_time(None);
        self.store.store_trigger(Box::new(trigger), false)
    }

    // ── Pause / resume ─────────────────────────────────────────────────

    pub fn pause_job(&self, key: &JobKey) -> Result<()> {
        self.ensure_not_shutdown()?;
        self.store.pause_job(key)
    }

    pub fn resume_job(&self, key: &JobKey) -> Result<()> {
        self.ensure_not_shutdown()?;
        self.store.resume_job(key)
    }

    pub fn pause_jobs(&self, matcher: &dyn Matcher<JobKey>) -> Result<Vec<String>> {
        self.ensure_not_shutdown()?;
        self.store.pause_jobs(matcher)
    }

    pub fn resume_jobs(&self, matcher: &dyn Matcher<JobKey>) -> Result<Vec<String>> {
        self.ensure_not_shutdown()?;
        self.store.resume_jobs(matcher)
    }

    pub fn pause_trigger(&self, key: &TriggerKey) -> Result<()> {
        self.ensure_not_shutdown()?;
        self.store.pause_trigger(key)
    }

    pub fn resume_trigger(&self, key: &TriggerKey) -> Result<()> {
        self.ensure_not_shutdown()?;
        self.store.resume_trigger(key)
    }

    pub fn pause_triggers(&self, matcher: &dyn Matcher<TriggerKey>) -> Result<Vec<String>> {
        self.ensure_not_shutdown()?;
        self.store.pause_triggers(matcher)
    }

    pub fn resume_triggers(&self, matcher: &dyn Matcher<TriggerKey>) -> Result<Vec<String>> {
        self.ensure_not_shutdown()?;
        self.store.resume_triggers(matcher)
    }

    pub fn pause_all(&self) -> Result<()> {
        self.ensure_not_shutdown()?;
        self.store.pause_all();
        Ok(())
    }

    pub fn resume_all(&self) -> Result<()> {
        self.ensure_not_shutdown()?;
        self.store.resume_all();
        Ok(())
    }

    // ── Interrupt ──────────────────────────────────────────────────────

    /// Request cooperative interruption of every currently executing
    /// instance of `job_key`. Errors if a matching instance is running but
    /// its job doesn't support interruption.
    pub fn interrupt_job(&self, job_key: &JobKey) -> Result<bool> {
        let mut found = false;
        let mut interrupted = false;
        for entry in self.registry.iter() {
            if &entry.job_key == job_key {
                found = true;
                if entry.is_interruptible {
                    entry.request_interrupt();
                    interrupted = true;
                }
            }
        }
        if found && !interrupted {
            return Err(SchedulerError::unable_to_interrupt(job_key.to_string()));
        }
        Ok(interrupted)
    }

    pub fn interrupt_fire_instance(&self, fire_instance_id: &str) -> Result<bool> {
        match self.registry.get(fire_instance_id) {
            Some(entry) if entry.is_interruptible => {
                entry.request_interrupt();
                Ok(true)
            }
            Some(entry) => Err(SchedulerError::unable_to_interrupt(entry.job_key.to_string())),
            None => Ok(false),
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn get_job_detail(&self, key: &JobKey) -> Option<JobDetail> {
        self.store.get_job_detail(key)
    }

    pub fn get_trigger_state(&self, key: &TriggerKey) -> TriggerState {
        self.store.get_trigger_state(key)
    }

    pub fn check_job_exists(&self, key: &JobKey) -> bool {
        self.store.job_exists(key)
    }

    pub fn check_trigger_exists(&self, key: &TriggerKey) -> bool {
        self.store.trigger_exists(key)
    }

    pub fn get_trigger_keys_for_job(&self, key: &JobKey) -> Vec<TriggerKey> {
        self.store.get_trigger_keys_for_job(key)
    }

    // ── Listeners ──────────────────────────────────────────────────────

    pub fn add_job_listener(&self, listener: Arc<dyn JobListener>, matchers: Vec<Arc<dyn Matcher<JobKey>>>) {
        self.listeners.add_job_listener(listener, matchers);
    }

    pub fn remove_job_listener(&self, name: &str) -> bool {
        self.listeners.remove_job_listener(name)
    }

    pub fn add_trigger_listener(&self, listener: Arc<dyn TriggerListener>, matchers: Vec<Arc<dyn Matcher<TriggerKey>>>) {
        self.listeners.add_trigger_listener(listener, matchers);
    }

    pub fn remove_trigger_listener(&self, name: &str) -> bool {
        self.listeners.remove_trigger_listener(name)
    }

    pub fn add_scheduler_listener(&self, listener: Arc<dyn SchedulerListener>) {
        self.listeners.add_scheduler_listener(listener);
    }

    pub fn remove_scheduler_listener(&self, name: &str) -> bool {
        self.listeners.remove_scheduler_listener(name)
    }
}

fn ephemeral_trigger_key() -> TriggerKey {
    TriggerKey::in_group(format!("MANUAL_TRIGGER.{}", uuid::Uuid::new_v4()), DEFAULT_GROUP)
}

fn to_chrono(duration: StdDuration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero())
}
