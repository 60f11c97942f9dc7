//! The scheduler thread: the acquire/wait/fire/dispatch loop (spec §4.5).
//!
//! Runs as one tokio task rather than a dedicated OS thread; `paused`/
//! `shutting_down` are `AtomicBool`s instead of monitor-guarded booleans,
//! and the monitor's "signal record" is a `tokio::sync::Notify` paired with
//! the signaler's unbounded channel (see `jobs::signaler`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::jobs::job::JobFactory;
use crate::jobs::key::TriggerKey;
use crate::jobs::listeners::ListenerManager;
use crate::jobs::run_shell::{ExecutingJobsRegistry, JobRunShell};
use crate::jobs::signaler::Signal;
use crate::jobs::store::JobStore;
use crate::jobs::trigger::CompletionInstruction;
use crate::jobs::worker_pool::WorkerPool;

/// Below this margin a candidate new next-fire-time is close enough to the
/// trigger the scheduler is already waiting on that it isn't worth
/// re-acquiring early for. The source scheduler draws this line at 70ms for
/// persistent stores and 7ms for its in-memory one; this crate only ships
/// the in-memory store, so it uses the tighter figure.
const SIGNIFICANTLY_EARLIER_THRESHOLD_MS: i64 = 7;

pub struct SchedulerThread {
    store: Arc<dyn JobStore>,
    pool: Arc<WorkerPool>,
    listeners: Arc<ListenerManager>,
    job_factory: Arc<dyn JobFactory>,
    registry: Arc<ExecutingJobsRegistry>,
    signal_rx: parking_lot::Mutex<mpsc::UnboundedReceiver<Signal>>,
    signal_notify: Arc<Notify>,
    paused: Arc<AtomicBool>,
    resume_notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    idle_wait_time: ChronoDuration,
    misfire_threshold: ChronoDuration,
    max_batch_size: usize,
    batch_time_window: ChronoDuration,
    /// Set once an `acquire_next_triggers` failure has been logged, cleared
    /// on the next successful acquisition, so a run of consecutive
    /// persistence failures logs only its first occurrence.
    acquire_failure_logged: AtomicBool,
}

impl SchedulerThread {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        pool: Arc<WorkerPool>,
        listeners: Arc<ListenerManager>,
        job_factory: Arc<dyn JobFactory>,
        registry: Arc<ExecutingJobsRegistry>,
        signal_rx: mpsc::UnboundedReceiver<Signal>,
        signal_notify: Arc<Notify>,
        paused: Arc<AtomicBool>,
        resume_notify: Arc<Notify>,
        shutting_down: Arc<AtomicBool>,
        idle_wait_time: ChronoDuration,
        misfire_threshold: ChronoDuration,
        max_batch_size: usize,
        batch_time_window: ChronoDuration,
    ) -> Self {
        Self {
            store,
            pool,
            listeners,
            job_factory,
            registry,
            signal_rx: parking_lot::Mutex::new(signal_rx),
            signal_notify,
            paused,
            resume_notify,
            shutting_down,
            idle_wait_time,
            misfire_threshold,
            max_batch_size,
            batch_time_window,
            acquire_failure_logged: AtomicBool::new(false),
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self: Arc<Self>) {
        tracing::info!("scheduler thread started");
        while !self.shutting_down.load(Ordering::Acquire) {
            self.wait_while_paused().await;
            if self.shutting_down.load(Ordering::Acquire) {
                break;
            }

            let available = self.pool.block_for_available_threads().await;
            if self.shutting_down.load(Ordering::Acquire) {
                break;
            }

            self.drain_pending_signals().await;

            let max_count = available.clamp(1, self.max_batch_size.max(1));
            let no_later_than = Utc::now() + self.idle_wait_time;
            let batch = match self
                .store
                .acquire_next_triggers(no_later_than, max_count, self.batch_time_window)
            {
                Ok(batch) => {
                    self.acquire_failure_logged.store(false, Ordering::Release);
                    batch
                }
                Err(err) => {
                    if !self.acquire_failure_logged.swap(true, Ordering::AcqRel) {
                        err.log();
                    }
                    self.listeners.notify_scheduler_error(&err.to_string()).await;
                    self.idle_wait_jittered().await;
                    continue;
                }
            };

            if batch.is_empty() {
                self.idle_wait_jittered().await;
                continue;
            }

            let trigger_time = batch[0].next_fire_time().unwrap_or_else(Utc::now);
            if self.wait_until_due_or_significantly_earlier(trigger_time).await {
                for trigger in &batch {
                    self.store.release_acquired_trigger(trigger.key());
                }
                continue;
            }
            if self.shutting_down.load(Ordering::Acquire) {
                for trigger in &batch {
                    self.store.release_acquired_trigger(trigger.key());
                }
                break;
            }

            self.dispatch_batch(batch).await;
            self.idle_wait_jittered().await;
        }
        tracing::info!("scheduler thread stopped");
    }

    async fn wait_while_paused(&self) {
        while self.paused.load(Ordering::Acquire) && !self.shutting_down.load(Ordering::Acquire) {
            tokio::select! {
                _ = self.resume_notify.notified() => {}
                _ = tokio::time::sleep(StdDuration::from_millis(200)) => {}
            }
        }
    }

    async fn dispatch_batch(&self, batch: Vec<Box<dyn crate::jobs::trigger::Trigger>>) {
        let keys: Vec<TriggerKey> = batch.iter().map(|t| t.key().clone()).collect();
        for bundle in self.store.triggers_fired(&keys).into_iter().flatten() {
            let trigger_key = bundle.trigger.key().clone();
            let shell = JobRunShell::new(
                bundle,
                Arc::clone(&self.store),
                Arc::clone(&self.listeners),
                Arc::clone(&self.job_factory),
                Arc::clone(&self.registry),
            );
            let accepted = self.pool.run_in_thread(async move { shell.run().await }).await;
            if !accepted {
                tracing::warn!(trigger = %trigger_key, "worker pool rejected a fire, failing its job's triggers");
                self.store
                    .triggered_job_complete(&trigger_key, CompletionInstruction::SetAllJobTriggersError);
            }
        }
    }

    /// Sleeps until `trigger_time`, waking early if a scheduling-change
    /// signal names a candidate trigger time significantly earlier than the
    /// one already being waited on. Returns `true` if the caller should
    /// release its acquired batch and loop back to re-acquire.
    async fn wait_until_due_or_significantly_earlier(&self, trigger_time: DateTime<Utc>) -> bool {
        loop {
            let now = Utc::now();
            if now >= trigger_time || self.shutting_down.load(Ordering::Acquire) {
                return false;
            }
            let remaining = (trigger_time - now).to_std().unwrap_or(StdDuration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(remaining) => return false,
                _ = self.signal_notify.notified() => {
                    if let Some(candidate) = self.drain_pending_signals().await {
                        if Self::is_significantly_earlier(candidate, trigger_time) {
                            return true;
                        }
                    }
                }
            }
        }
    }

    fn is_significantly_earlier(candidate: Option<DateTime<Utc>>, trigger_time: DateTime<Utc>) -> bool {
        match candidate {
            None => true,
            Some(candidate) => {
                candidate < trigger_time
                    && (trigger_time - candidate) >= ChronoDuration::milliseconds(SIGNIFICANTLY_EARLIER_THRESHOLD_MS)
            }
        }
    }

    /// Drains every pending signal, forwarding listener-facing ones
    /// immediately and returning the most recent scheduling-change
    /// candidate, if any.
    async fn drain_pending_signals(&self) -> Option<DateTime<Utc>> {
        let mut pending = Vec::new();
        {
            let mut rx = self.signal_rx.lock();
            while let Ok(signal) = rx.try_recv() {
                pending.push(signal);
            }
        }

        let mut latest_candidate = None;
        for signal in pending {
            match signal {
                Signal::SchedulingChange(candidate) => latest_candidate = Some(candidate),
                Signal::TriggerMisfired(trigger_key) => {
                    self.listeners.notify_trigger_misfired(&trigger_key).await;
                }
                Signal::TriggerFinalized(trigger_key) => {
                    self.listeners.notify_trigger_finalized(&trigger_key).await;
                }
                Signal::JobDeleted(job_key) => {
                    self.listeners.notify_job_deleted(&job_key).await;
                }
                Signal::SchedulerError(message) => {
                    self.listeners.notify_scheduler_error(&message).await;
                }
            }
        }
        latest_candidate
    }

    async fn idle_wait_jittered(&self) {
        let base_ms = self.idle_wait_time.num_milliseconds().max(0) as u64;
        let jittered_ms = if base_ms == 0 {
            0
        } else {
            rand::rng().random_range((base_ms * 8 / 10)..=(base_ms * 12 / 10))
        };
        tokio::select! {
            _ = tokio::time::sleep(StdDuration::from_millis(jittered_ms)) => {}
            _ = self.signal_notify.notified() => {
                let _ = self.drain_pending_signals().await;
            }
        }
    }
}
