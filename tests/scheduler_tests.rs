//! Integration tests for the six concrete scenarios and the general
//! invariants they stand in for, exercised through the public crate API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use chronoforge::jobs::key::{GroupMatcher, JobKind};
use chronoforge::jobs::store::InMemoryJobStore;
use chronoforge::jobs::trigger::MisfireInstruction;
use chronoforge::prelude::*;

fn config_with(pool_size: usize, idle_wait_ms: u64, max_batch_size: usize) -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.thread_pool.size = pool_size;
    config.idle_wait_time = StdDuration::from_millis(idle_wait_ms);
    config.batch_time_window = StdDuration::ZERO;
    config.max_batch_size = max_batch_size;
    config
}

fn store_for(config: &SchedulerConfig) -> Arc<InMemoryJobStore> {
    Arc::new(InMemoryJobStore::new(
        chrono::Duration::from_std(config.misfire_threshold).unwrap_or_else(|_| chrono::Duration::seconds(60)),
    ))
}

struct NoopJob;

#[async_trait]
impl Job for NoopJob {
    async fn execute(&self, _context: &mut JobContext) -> Result<()> {
        Ok(())
    }
}

fn durable_job(key: JobKey) -> JobDetail {
    JobDetail::builder(key, Arc::new(NoopJob)).durable(true).build()
}

fn bare_store() -> InMemoryJobStore {
    InMemoryJobStore::new(Duration::seconds(60))
}

/// Scenario 1: three simple triggers on a durable job, acquired one at a
/// time, returned in `(next_fire_time, -priority, group, name)` order.
#[test]
fn acquisition_ordering() {
    let store = bare_store();
    let job_key = JobKey::new("shared-job");
    store.store_job(durable_job(job_key.clone()), false, false).unwrap();

    let base = Utc::now();
    let mut t1 = SimpleTrigger::once(
        TriggerKey::in_group("trigger1", "group1"),
        job_key.clone(),
        base + Duration::milliseconds(200_000),
    );
    let mut t2 = SimpleTrigger::once(
        TriggerKey::in_group("trigger2", "group1"),
        job_key.clone(),
        base + Duration::milliseconds(50_000),
    );
    let mut t3 = SimpleTrigger::once(
        TriggerKey::in_group("trigger3", "group2"),
        job_key.clone(),
        base + Duration::milliseconds(100_000),
    );
    t1.compute_first_fire_time(None);
    t2.compute_first_fire_time(None);
    t3.compute_first_fire_time(None);
    store.store_trigger(Box::new(t1), false).unwrap();
    store.store_trigger(Box::new(t2), false).unwrap();
    store.store_trigger(Box::new(t3), false).unwrap();

    let no_later_than = base + Duration::milliseconds(210_000);

    let first = store.acquire_next_triggers(no_later_than, 1, Duration::zero()).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].key().name(), "trigger2");

    let second = store.acquire_next_triggers(no_later_than, 1, Duration::zero()).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].key().name(), "trigger3");

    let third = store.acquire_next_triggers(no_later_than, 1, Duration::zero()).unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].key().name(), "trigger1");

    let fourth = store.acquire_next_triggers(no_later_than, 1, Duration::zero()).unwrap();
    assert!(fourth.is_empty());
}

/// Scenario 2: a batch with a time window. Verifies the candidate cutoff
/// extends by the window, and that the window also trims the batch
/// relative to its first (earliest) acquired trigger.
#[test]
fn batch_with_window() {
    let store = bare_store();
    let job_key = JobKey::new("windowed-job");
    store.store_job(durable_job(job_key.clone()), false, false).unwrap();

    let base = Utc::now();
    let fire_at = |ms: i64| base + Duration::milliseconds(ms);

    let mut early = SimpleTrigger::once(TriggerKey::new("early"), job_key.clone(), fire_at(-1_000))
        .with_misfire_instruction(MisfireInstruction::IgnoreMisfirePolicy);
    let mut trigger1 = SimpleTrigger::once(TriggerKey::new("trigger1"), job_key.clone(), fire_at(200_000));
    let mut trigger2 = SimpleTrigger::once(TriggerKey::new("trigger2"), job_key.clone(), fire_at(210_000));
    let mut trigger3 = SimpleTrigger::once(TriggerKey::new("trigger3"), job_key.clone(), fire_at(220_000));
    let mut trigger4 = SimpleTrigger::once(TriggerKey::new("trigger4"), job_key.clone(), fire_at(230_000));
    let mut trigger10 = SimpleTrigger::once(TriggerKey::new("trigger10"), job_key.clone(), fire_at(500_000));
    for t in [
        &mut early, &mut trigger1, &mut trigger2, &mut trigger3, &mut trigger4, &mut trigger10,
    ] {
        t.compute_first_fire_time(None);
    }
    for t in [early, trigger1, trigger2, trigger3, trigger4, trigger10] {
        store.store_trigger(Box::new(t), false).unwrap();
    }

    let no_later_than = fire_at(210_000);

    let batch = store.acquire_next_triggers(no_later_than, 4, Duration::milliseconds(1_000)).unwrap();
    let names: Vec<&str> = batch.iter().map(|t| t.key().name()).collect();
    assert_eq!(names, vec!["early"]);
    for t in &batch {
        store.release_acquired_trigger(t.key());
    }

    let batch = store
        .acquire_next_triggers(no_later_than, 4, Duration::milliseconds(205_000))
        .unwrap();
    let names: Vec<&str> = batch.iter().map(|t| t.key().name()).collect();
    assert_eq!(names, vec!["early", "trigger1"]);
    for t in &batch {
        store.release_acquired_trigger(t.key());
    }

    store.remove_trigger(&TriggerKey::new("early")).unwrap();

    let batch = store
        .acquire_next_triggers(no_later_than, 5, Duration::milliseconds(100_000))
        .unwrap();
    let names: Vec<&str> = batch.iter().map(|t| t.key().name()).collect();
    assert_eq!(names, vec!["trigger1", "trigger2", "trigger3", "trigger4"]);
}

/// Scenario 3: pausing a job group before the job/trigger even exist still
/// lands the new trigger in `PAUSED`.
#[test]
fn pause_group_affects_future_triggers() {
    let store = bare_store();
    store.pause_jobs(&GroupMatcher::<JobKind>::group_equals("G")).unwrap();

    let job_key = JobKey::in_group("j2", "G");
    store.store_job(durable_job(job_key.clone()), false, false).unwrap();

    let trigger_key = TriggerKey::in_group("t", "TG");
    let mut trigger = SimpleTrigger::once(trigger_key.clone(), job_key, Utc::now());
    trigger.compute_first_fire_time(None);
    store.store_trigger(Box::new(trigger), false).unwrap();

    assert_eq!(store.get_trigger_state(&trigger_key), TriggerState::Paused);
}

struct RecordingJob {
    label: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Job for RecordingJob {
    async fn execute(&self, _context: &mut JobContext) -> Result<()> {
        self.log.lock().push(self.label);
        Ok(())
    }
}

/// Scenario 4: two simple triggers due at the same instant, on a
/// single-worker pool. The higher-priority trigger is dispatched first.
#[tokio::test]
async fn priority_tie_break() {
    let config = config_with(1, 30, 1);
    let store = store_for(&config);
    let sched = Scheduler::new(config, store);
    sched.start().await.unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let now = Utc::now();

    let low_key = JobKey::new("low-priority-job");
    let high_key = JobKey::new("high-priority-job");
    let low_detail = JobDetail::builder(
        low_key.clone(),
        Arc::new(RecordingJob {
            label: "T1",
            log: Arc::clone(&log),
        }),
    )
    .build();
    let high_detail = JobDetail::builder(
        high_key.clone(),
        Arc::new(RecordingJob {
            label: "T2",
            log: Arc::clone(&log),
        }),
    )
    .build();

    let t1 = SimpleTrigger::once(TriggerKey::new("t1"), low_key, now).with_priority(5);
    let t2 = SimpleTrigger::once(TriggerKey::new("t2"), high_key, now).with_priority(10);

    sched.schedule_job(low_detail, Box::new(t1)).unwrap();
    sched.schedule_job(high_detail, Box::new(t2)).unwrap();

    for _ in 0..100 {
        if log.lock().len() == 2 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }

    assert_eq!(*log.lock(), vec!["T2", "T1"]);
    sched.shutdown(true).await;
}

struct SleepingJob {
    millis: u64,
    starts: Arc<Mutex<Vec<chrono::DateTime<Utc>>>>,
}

#[async_trait]
impl Job for SleepingJob {
    async fn execute(&self, _context: &mut JobContext) -> Result<()> {
        self.starts.lock().push(Utc::now());
        tokio::time::sleep(StdDuration::from_millis(self.millis)).await;
        Ok(())
    }
}

/// Scenario 5: a non-concurrent job with two triggers both due now. The
/// second fire does not start until the first has completed.
#[tokio::test]
async fn non_concurrent_job_serializes_fires() {
    let config = config_with(4, 30, 4);
    let store = store_for(&config);
    let sched = Scheduler::new(config, store);
    sched.start().await.unwrap();

    let starts = Arc::new(Mutex::new(Vec::new()));
    let job_key = JobKey::new("non-concurrent-job");
    let detail = JobBuilder::new(
        job_key.clone(),
        Arc::new(SleepingJob {
            millis: 300,
            starts: Arc::clone(&starts),
        }),
    )
    .durable(true)
    .disallow_concurrent_execution(true)
    .build();
    sched.add_job(detail, false, false).unwrap();

    let now = Utc::now();
    sched
        .schedule_trigger(Box::new(SimpleTrigger::once(TriggerKey::new("a"), job_key.clone(), now)))
        .unwrap();
    sched
        .schedule_trigger(Box::new(SimpleTrigger::once(TriggerKey::new("b"), job_key, now)))
        .unwrap();

    for _ in 0..150 {
        if starts.lock().len() == 2 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }

    let recorded = starts.lock().clone();
    assert_eq!(recorded.len(), 2);
    let gap = recorded[1] - recorded[0];
    assert!(
        gap >= Duration::milliseconds(300),
        "expected the second fire to start at least 300ms after the first, got {gap}"
    );
    sched.shutdown(true).await;
}

struct CountingJob(Arc<AtomicU32>);

#[async_trait]
impl Job for CountingJob {
    async fn execute(&self, _context: &mut JobContext) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct AlwaysVetoListener {
    fired: AtomicU32,
}

#[async_trait]
impl TriggerListener for AlwaysVetoListener {
    fn name(&self) -> &str {
        "always-veto"
    }

    async fn trigger_fired(&self, _trigger_key: &TriggerKey, _context: &JobContext) {
        self.fired.fetch_add(1, Ordering::SeqCst);
    }

    async fn veto_job_execution(&self, _trigger_key: &TriggerKey, _context: &JobContext) -> bool {
        true
    }
}

struct FinalizedCountingListener {
    finalized: AtomicU32,
}

#[async_trait]
impl SchedulerListener for FinalizedCountingListener {
    fn name(&self) -> &str {
        "finalized-counter"
    }

    async fn trigger_finalized(&self, _trigger_key: &TriggerKey) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scenario 6: a trigger listener vetoes every fire of a trigger configured
/// for 3 total fires. The job body never runs, `trigger_finalized` fires
/// exactly once, and the listener observes all 3 fires.
#[tokio::test]
async fn veto_path_prevents_job_execution() {
    let config = config_with(2, 20, 4);
    let store = store_for(&config);
    let sched = Scheduler::new(config, store);

    let veto_listener = Arc::new(AlwaysVetoListener { fired: AtomicU32::new(0) });
    let finalized_listener = Arc::new(FinalizedCountingListener {
        finalized: AtomicU32::new(0),
    });
    sched.add_trigger_listener(veto_listener.clone(), Vec::new());
    sched.add_scheduler_listener(finalized_listener.clone());

    sched.start().await.unwrap();

    let job_executions = Arc::new(AtomicU32::new(0));
    let job_key = JobKey::new("vetoed-job");
    let detail = JobDetail::builder(job_key.clone(), Arc::new(CountingJob(Arc::clone(&job_executions)))).build();
    let trigger = SimpleTrigger::new(
        TriggerKey::new("vetoed-trigger"),
        job_key,
        Utc::now(),
        Duration::milliseconds(30),
        2, // fires at times_triggered 0, 1, 2 -> 3 total fires
    );
    sched.schedule_job(detail, Box::new(trigger)).unwrap();

    for _ in 0..150 {
        if finalized_listener.finalized.load(Ordering::SeqCst) >= 1 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }

    assert_eq!(job_executions.load(Ordering::SeqCst), 0);
    assert_eq!(finalized_listener.finalized.load(Ordering::SeqCst), 1);
    assert_eq!(veto_listener.fired.load(Ordering::SeqCst), 3);
    sched.shutdown(true).await;
}

/// General invariant: `NORMAL` implies a next fire time, `COMPLETE` implies
/// none.
#[test]
fn trigger_state_next_fire_time_correspondence() {
    let store = bare_store();
    let job_key = JobKey::new("invariant-job");
    store.store_job(durable_job(job_key.clone()), false, false).unwrap();

    let trigger_key = TriggerKey::new("invariant-trigger");
    let mut trigger = SimpleTrigger::once(trigger_key.clone(), job_key, Utc::now() - Duration::seconds(5));
    trigger.compute_first_fire_time(None);
    store.store_trigger(Box::new(trigger), false).unwrap();
    assert_eq!(store.get_trigger_state(&trigger_key), TriggerState::Normal);

    let acquired = store.acquire_next_triggers(Utc::now(), 1, Duration::zero()).unwrap();
    let fired = store.triggers_fired(&[acquired[0].key().clone()]);
    assert!(fired[0].is_some());
    store.triggered_job_complete(&trigger_key, CompletionInstruction::SetTriggerComplete);
    assert_eq!(store.get_trigger_state(&trigger_key), TriggerState::Complete);
}

/// General invariant: pausing the same trigger twice is equivalent to once.
#[test]
fn pause_trigger_is_idempotent() {
    let store = bare_store();
    let job_key = JobKey::new("idempotent-job");
    store.store_job(durable_job(job_key.clone()), false, false).unwrap();
    let trigger_key = TriggerKey::new("idempotent-trigger");
    let mut trigger = SimpleTrigger::once(trigger_key.clone(), job_key, Utc::now() + Duration::hours(1));
    trigger.compute_first_fire_time(None);
    store.store_trigger(Box::new(trigger), false).unwrap();

    store.pause_trigger(&trigger_key).unwrap();
    store.pause_trigger(&trigger_key).unwrap();
    assert_eq!(store.get_trigger_state(&trigger_key), TriggerState::Paused);

    store.resume_trigger(&trigger_key).unwrap();
    store.resume_trigger(&trigger_key).unwrap();
    assert_eq!(store.get_trigger_state(&trigger_key), TriggerState::Normal);
}
