//! Job capability, `JobDetail`, and `JobDataMap`.
//!
//! `Job` is the user-supplied work unit; `JobDetail` is the store's record
//! around it (identity, flags, data): durability, recoverability, and a
//! concurrency-exclusion flag alongside the job's data map.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SchedulerError};
use crate::jobs::key::JobKey;

/// Execution context handed to a job body for the duration of one fire.
pub struct JobContext {
    /// Identity of the job being executed.
    pub job_key: JobKey,
    /// Opaque id unique to this particular fire (distinct from retries of
    /// the same scheduled time - see `GLOSSARY: Fire-instance id`).
    pub fire_instance_id: String,
    /// The firing job's data map. Triggers in this crate carry no data map
    /// of their own, so this is a plain copy of `JobDetail.job_data`, not a
    /// merge.
    pub merged_data: JobDataMap,
    /// Number of times this same fire has been re-executed via
    /// `CompletionInstruction::ReExecuteJob`.
    pub refire_count: u32,
    /// Cooperative interrupt flag. A job body should poll this during long
    /// work if it wants to honor `Scheduler::interrupt`.
    interrupted: Arc<std::sync::atomic::AtomicBool>,
}

impl JobContext {
    pub fn new(job_key: JobKey, fire_instance_id: String, merged_data: JobDataMap) -> Self {
        Self {
            job_key,
            fire_instance_id,
            merged_data,
            refire_count: 0,
            interrupted: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Whether an interrupt has been requested for this fire.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub(crate) fn interrupt_handle(&self) -> Arc<std::sync::atomic::AtomicBool> {
        Arc::clone(&self.interrupted)
    }
}

/// A user job body. Implementors perform the actual work; everything around
/// firing, retrying, and serializing is the scheduler's concern.
#[async_trait]
pub trait Job: Send + Sync {
    /// Run the job. An `Err` is captured by the `JobRunShell` as a
    /// `JobExecutionError` and handed to the trigger's completion logic; it
    /// does not itself stop the trigger from firing again.
    async fn execute(&self, context: &mut JobContext) -> Result<()>;

    /// Whether this job supports cooperative interruption. Jobs that return
    /// `true` should poll `context.is_interrupted()` during long work.
    fn is_interruptible(&self) -> bool {
        false
    }

    /// Human-readable job type name, used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// String-keyed data carried alongside a job or trigger. Typed accessors
/// mirror the source scheduler's `JobDataMap`; the `dirty` flag backs
/// `persist_job_data_after_execution` (the store only needs to re-persist a
/// job's map when it was actually mutated during execution).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDataMap {
    entries: HashMap<String, Value>,
    #[serde(skip)]
    dirty: bool,
}

impl JobDataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
        self.dirty = true;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key)?.as_str()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.entries.get(key)?.as_i64()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.entries.get(key)?.as_bool()
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.entries.get(key)?.as_f64()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.dirty = true;
        self.entries.remove(key)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Merge `other` on top of `self`, `other`'s entries winning on
    /// conflict. Used to build the per-fire merged data map (job map plus
    /// trigger map).
    pub fn merged_with(&self, other: &JobDataMap) -> JobDataMap {
        let mut merged = self.clone();
        for (k, v) in &other.entries {
            merged.entries.insert(k.clone(), v.clone());
        }
        merged.dirty = false;
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

/// The store's record around a `Job` implementation: identity, durability
/// and concurrency flags, and a data map.
#[derive(Clone)]
pub struct JobDetail {
    pub key: JobKey,
    pub description: Option<String>,
    pub job_data: JobDataMap,
    /// May exist in the store without any trigger referencing it.
    pub durable: bool,
    /// Should be re-fired if the scheduler terminated abnormally mid-fire.
    /// Recovery itself (crash detection) is a store-specific concern; this
    /// flag only records the job's stated preference.
    pub recoverable: bool,
    /// At most one trigger of this job may be executing at a time.
    pub concurrent_execution_disallowed: bool,
    /// Whether the store should persist `job_data` mutations made during
    /// `execute` back onto the stored `JobDetail`.
    pub persist_job_data_after_execution: bool,
    job_prototype: Arc<dyn Job>,
}

impl fmt::Debug for JobDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDetail")
            .field("key", &self.key)
            .field("durable", &self.durable)
            .field("recoverable", &self.recoverable)
            .field(
                "concurrent_execution_disallowed",
                &self.concurrent_execution_disallowed,
            )
            .finish()
    }
}

impl JobDetail {
    pub fn builder(key: JobKey, job: Arc<dyn Job>) -> JobBuilder {
        JobBuilder::new(key, job)
    }

    /// The job instance this detail wraps. Cloning the `Arc` stands in for
    /// the source scheduler's job-factory instantiation step: Rust has no
    /// reflective no-arg construction, so the stored prototype is the
    /// idiomatic analogue (see `SimpleJobFactory`).
    pub fn job_instance(&self) -> Arc<dyn Job> {
        Arc::clone(&self.job_prototype)
    }
}

/// Builder for `JobDetail`.
pub struct JobBuilder {
    key: JobKey,
    job: Arc<dyn Job>,
    description: Option<String>,
    job_data: JobDataMap,
    durable: bool,
    recoverable: bool,
    concurrent_execution_disallowed: bool,
    persist_job_data_after_execution: bool,
}

impl JobBuilder {
    pub fn new(key: JobKey, job: Arc<dyn Job>) -> Self {
        Self {
            key,
            job,
            description: None,
            job_data: JobDataMap::new(),
            durable: false,
            recoverable: false,
            concurrent_execution_disallowed: false,
            persist_job_data_after_execution: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn job_data(mut self, data: JobDataMap) -> Self {
        self.job_data = data;
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn disallow_concurrent_execution(mut self, disallow: bool) -> Self {
        self.concurrent_execution_disallowed = disallow;
        self
    }

    pub fn persist_job_data_after_execution(mut self, persist: bool) -> Self {
        self.persist_job_data_after_execution = persist;
        self
    }

    pub fn build(self) -> JobDetail {
        JobDetail {
            key: self.key,
            description: self.description,
            job_data: self.job_data,
            durable: self.durable,
            recoverable: self.recoverable,
            concurrent_execution_disallowed: self.concurrent_execution_disallowed,
            persist_job_data_after_execution: self.persist_job_data_after_execution,
            job_prototype: self.job,
        }
    }
}

/// `newJob(bundle, scheduler) -> Job instance` (spec §6). Rust has no
/// reflective construction, so the default factory simply clones the
/// prototype `Arc<dyn Job>` stored on the `JobDetail` - this is the
/// idiomatic analogue the SUPPLEMENT section in SPEC_FULL.md calls for.
pub trait JobFactory: Send + Sync {
    fn new_job(&self, detail: &JobDetail) -> Result<Arc<dyn Job>>;
}

/// Default factory: clones the prototype instance stored on the detail.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleJobFactory;

impl JobFactory for SimpleJobFactory {
    fn new_job(&self, detail: &JobDetail) -> Result<Arc<dyn Job>> {
        Ok(detail.job_instance())
    }
}

/// Wraps any error into a `JobExecutionError`, the single crate error type
/// carrying a code rather than a dedicated per-subsystem error enum.
pub fn wrap_execution_error(err: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::job_execution(err.to_string())
}
