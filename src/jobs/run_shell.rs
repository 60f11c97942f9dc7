//! `JobRunShell`: the per-fire safety envelope a worker runs (spec §4.7).
//!
//! Wraps listener notification, job instantiation, execution, and
//! completion dispatch around a single `TriggerFiredBundle`. A job that
//! panics is caught at the `execute` boundary (via `catch_unwind`) rather
//! than taking down the worker task, mirroring the source scheduler's
//! "catch `Throwable`, wrap as a `JobExecutionException`" behavior.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::error::Result;
use crate::jobs::job::{wrap_execution_error, JobContext, JobFactory};
use crate::jobs::key::{JobKey, TriggerKey};
use crate::jobs::listeners::ListenerManager;
use crate::jobs::store::{JobStore, TriggerFiredBundle};
use crate::jobs::trigger::CompletionInstruction;

/// Bookkeeping for a single in-flight fire, keyed by fire-instance id, so
/// `Scheduler::interrupt` can find and flag a running job without either
/// side needing a handle to the other (spec §4.8: "locate currently
/// executing instances and request cooperative interrupt").
#[derive(Clone)]
pub struct ExecutingJobEntry {
    pub job_key: JobKey,
    pub trigger_key: TriggerKey,
    pub fire_instance_id: String,
    pub is_interruptible: bool,
    interrupt_handle: Arc<AtomicBool>,
}

impl ExecutingJobEntry {
    pub fn request_interrupt(&self) {
        self.interrupt_handle.store(true, Ordering::SeqCst);
    }
}

pub type ExecutingJobsRegistry = dashmap::DashMap<String, ExecutingJobEntry>;

struct RegistrationGuard<'a> {
    registry: &'a ExecutingJobsRegistry,
    fire_instance_id: String,
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.fire_instance_id);
    }
}

/// Outcome of the trigger-fired notification stage of a run.
enum FireOutcome {
    Proceed,
    Vetoed(CompletionInstruction),
}

pub struct JobRunShell {
    bundle: TriggerFiredBundle,
    store: Arc<dyn JobStore>,
    listeners: Arc<ListenerManager>,
    job_factory: Arc<dyn JobFactory>,
    registry: Arc<ExecutingJobsRegistry>,
}

impl JobRunShell {
    pub fn new(
        bundle: TriggerFiredBundle,
        store: Arc<dyn JobStore>,
        listeners: Arc<ListenerManager>,
        job_factory: Arc<dyn JobFactory>,
        registry: Arc<ExecutingJobsRegistry>,
    ) -> Self {
        Self {
            bundle,
            store,
            listeners,
            job_factory,
            registry,
        }
    }

    /// Extensible no-op hook, run before each attempt (including re-execute
    /// loops).
    fn begin(&self) {}

    pub async fn run(mut self) {
        let trigger_key = self.bundle.trigger.key().clone();
        let job_key = self.bundle.job_detail.key.clone();
        let mut context = JobContext::new(
            job_key.clone(),
            self.bundle.fire_instance_id.clone(),
            self.bundle.job_detail.job_data.clone(),
        );

        loop {
            self.begin();

            let fire_outcome = match self.notify_fire_started(&trigger_key, &job_key, &context).await {
                Ok(outcome) => outcome,
                Err(panic_msg) => {
                    tracing::error!(trigger = %trigger_key, panic = %panic_msg, "listener panicked on trigger fired, abandoning this fire");
                    self.listeners.notify_scheduler_error(&panic_msg).await;
                    return;
                }
            };

            if let FireOutcome::Vetoed(instruction) = fire_outcome {
                self.store.triggered_job_complete(&trigger_key, instruction);
                return;
            }

            let result = match self.job_factory.new_job(&self.bundle.job_detail) {
                Ok(job) => self.execute_job(job, &mut context).await,
                Err(err) => {
                    self.listeners.notify_scheduler_error(&err.to_string()).await;
                    Err(err)
                }
            };

            let instruction = match self.finish_fire(&trigger_key, &job_key, &mut context, &result).await {
                Ok(instruction) => instruction,
                Err(panic_msg) => {
                    tracing::error!(trigger = %trigger_key, panic = %panic_msg, "listener panicked on job completion, abandoning this fire");
                    self.listeners.notify_scheduler_error(&panic_msg).await;
                    return;
                }
            };

            if instruction == CompletionInstruction::ReExecuteJob {
                context.refire_count += 1;
                continue;
            }

            self.store.triggered_job_complete(&trigger_key, instruction);
            return;
        }
    }

    /// Runs `notifyTriggerFired` and, on veto, the vetoed-completion path,
    /// catching a listener panic so it abandons this fire rather than taking
    /// down the worker task (spec §4.7 step 2).
    async fn notify_fire_started(
        &mut self,
        trigger_key: &TriggerKey,
        job_key: &JobKey,
        context: &JobContext,
    ) -> std::result::Result<FireOutcome, String> {
        let listeners = Arc::clone(&self.listeners);
        let trigger = &mut self.bundle.trigger;
        AssertUnwindSafe(async move {
            let vetoed = listeners.notify_trigger_fired(trigger_key, context).await;
            if vetoed {
                listeners.notify_job_execution_vetoed(job_key, context).await;
                let instruction = trigger.execution_complete(Some(context), None);
                listeners
                    .notify_trigger_complete(trigger_key, context, instruction)
                    .await;
                FireOutcome::Vetoed(instruction)
            } else {
                listeners.notify_job_to_be_executed(job_key, context).await;
                FireOutcome::Proceed
            }
        })
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(&payload))
    }

    async fn execute_job(&self, job: Arc<dyn crate::jobs::job::Job>, context: &mut JobContext) -> Result<()> {
        self.registry.insert(
            context.fire_instance_id.clone(),
            ExecutingJobEntry {
                job_key: context.job_key.clone(),
                trigger_key: self.bundle.trigger.key().clone(),
                fire_instance_id: context.fire_instance_id.clone(),
                is_interruptible: job.is_interruptible(),
                interrupt_handle: context.interrupt_handle(),
            },
        );
        let _guard = RegistrationGuard {
            registry: &self.registry,
            fire_instance_id: context.fire_instance_id.clone(),
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(job.execute(context))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(wrap_execution_error(panic_message(&payload))));
        tracing::info!(
            job = %context.job_key,
            fire_instance = %context.fire_instance_id,
            elapsed_ms = started.elapsed().as_millis(),
            ok = outcome.is_ok(),
            "job fire completed"
        );
        outcome
    }

    /// Runs the post-execution listener notifications, catching a listener
    /// panic so it abandons this fire rather than taking down the worker
    /// task (spec §4.7 step 2).
    async fn finish_fire(
        &mut self,
        trigger_key: &TriggerKey,
        job_key: &JobKey,
        context: &mut JobContext,
        result: &Result<()>,
    ) -> std::result::Result<CompletionInstruction, String> {
        let listeners = Arc::clone(&self.listeners);
        let trigger = &mut self.bundle.trigger;
        AssertUnwindSafe(async move {
            listeners.notify_job_was_executed(job_key, context, result).await;
            let instruction = trigger.execution_complete(Some(context), Some(result));
            listeners
                .notify_trigger_complete(trigger_key, context, instruction)
                .await;
            instruction
        })
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(&payload))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{Job, JobBuilder, JobDataMap, SimpleJobFactory};
    use crate::jobs::key::JobKey;
    use crate::jobs::signaler::ChannelSignaler;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::trigger::simple::SimpleTrigger;
    use crate::jobs::trigger::Trigger;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    struct OkJob;

    #[async_trait]
    impl Job for OkJob {
        async fn execute(&self, _context: &mut JobContext) -> Result<()> {
            Ok(())
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl Job for PanickingJob {
        async fn execute(&self, _context: &mut JobContext) -> Result<()> {
            panic!("boom");
        }
    }

    fn bundle_for(job_key: JobKey, job: Arc<dyn Job>, store: &InMemoryJobStore) -> TriggerFiredBundle {
        let detail = JobBuilder::new(job_key.clone(), job).job_data(JobDataMap::new()).build();
        store.store_job(detail.clone(), false, true).unwrap();
        let trigger_key = crate::jobs::key::TriggerKey::new("t1");
        let mut trigger = SimpleTrigger::once(trigger_key, job_key, Utc::now() - Duration::seconds(1));
        trigger.compute_first_fire_time(None);
        store.store_trigger(Box::new(trigger), false).unwrap();
        let acquired = store.acquire_next_triggers(Utc::now(), 1, Duration::zero()).unwrap();
        let fired = store.triggers_fired(&[acquired[0].key().clone()]);
        fired.into_iter().next().unwrap().unwrap()
    }

    #[tokio::test]
    async fn successful_execution_completes_trigger() {
        let store = Arc::new(InMemoryJobStore::new(Duration::seconds(60)));
        let (signaler, _rx, _notify) = ChannelSignaler::new();
        store.initialize(Arc::new(signaler));
        let bundle = bundle_for(JobKey::new("j1"), Arc::new(OkJob), &store);
        let trigger_key = bundle.trigger.key().clone();

        let shell = JobRunShell::new(
            bundle,
            store.clone(),
            Arc::new(ListenerManager::new()),
            Arc::new(SimpleJobFactory),
            Arc::new(ExecutingJobsRegistry::new()),
        );
        shell.run().await;

        assert_eq!(
            store.get_trigger_state(&trigger_key),
            crate::jobs::trigger::TriggerState::Complete
        );
    }

    #[tokio::test]
    async fn panicking_job_is_caught_and_trigger_still_completes() {
        let store = Arc::new(InMemoryJobStore::new(Duration::seconds(60)));
        let (signaler, _rx, _notify) = ChannelSignaler::new();
        store.initialize(Arc::new(signaler));
        let bundle = bundle_for(JobKey::new("j2"), Arc::new(PanickingJob), &store);
        let trigger_key = bundle.trigger.key().clone();

        let shell = JobRunShell::new(
            bundle,
            store.clone(),
            Arc::new(ListenerManager::new()),
            Arc::new(SimpleJobFactory),
            Arc::new(ExecutingJobsRegistry::new()),
        );
        shell.run().await;

        assert_eq!(
            store.get_trigger_state(&trigger_key),
            crate::jobs::trigger::TriggerState::Complete
        );
    }
}
