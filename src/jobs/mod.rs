//! The scheduler core: identity, jobs, triggers, calendars, the store, the
//! worker pool, the scheduler thread, the per-fire run shell, listeners, and
//! the public facade that ties them together.

pub mod calendar;
pub mod job;
pub mod key;
pub mod listeners;
pub mod run_shell;
pub mod scheduler;
pub mod scheduler_thread;
pub mod signaler;
pub mod store;
pub mod trigger;
pub mod worker_pool;

pub use job::{Job, JobBuilder, JobContext, JobDataMap, JobDetail, JobFactory, SimpleJobFactory};
pub use key::{GroupMatcher, JobKey, Matcher, TriggerKey, DEFAULT_GROUP};
pub use run_shell::{ExecutingJobEntry, ExecutingJobsRegistry};
pub use scheduler::{RescheduleOutcome, Scheduler};
pub use store::{InMemoryJobStore, JobStore};
pub use trigger::{CompletionInstruction, MisfireInstruction, Trigger, TriggerState};
pub use worker_pool::WorkerPool;
