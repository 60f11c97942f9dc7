#![allow(clippy::result_large_err)]
//! # ChronoForge
//!
//! An in-process job scheduler: durable job and trigger identities, a
//! pluggable `JobStore`, a dedicated scheduler thread that acquires and
//! dispatches due triggers onto a bounded worker pool, and a listener bus
//! for observing the whole lifecycle.
//!
//! ## Architecture
//!
//! - **`jobs::key`** — `JobKey`/`TriggerKey` identity and group matchers.
//! - **`jobs::job`** — the `Job` trait, `JobDetail`, `JobDataMap`.
//! - **`jobs::calendar`** — exclusion calendars consulted during fire-time
//!   computation.
//! - **`jobs::trigger`** — the `Trigger` contract and its simple/cron/
//!   calendar-interval/daily-time-interval implementations.
//! - **`jobs::store`** — the `JobStore` contract and its in-memory
//!   implementation.
//! - **`jobs::worker_pool`** — bounded concurrent job execution.
//! - **`jobs::scheduler_thread`** — the acquire/wait/fire/dispatch loop.
//! - **`jobs::run_shell`** — the per-fire listener/execute/completion
//!   envelope.
//! - **`jobs::scheduler`** — the public `Scheduler` facade.
//! - **`jobs::listeners`** — job/trigger/scheduler listener registries.

pub mod config;
pub mod error;
pub mod jobs;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, Result, SchedulerError};

/// Re-export of the types most callers need to schedule and run jobs.
pub mod prelude {
    pub use crate::config::{SchedulerConfig, ThreadPoolConfig};
    pub use crate::error::{ErrorCode, ErrorContext, ErrorDetails, Result, SchedulerError};
    pub use crate::jobs::calendar::{
        AnnualCalendar, Calendar, CronCalendar, DailyCalendar, HolidayCalendar, MonthlyCalendar,
        WeeklyCalendar,
    };
    pub use crate::jobs::job::{Job, JobBuilder, JobContext, JobDataMap, JobDetail, JobFactory, SimpleJobFactory};
    pub use crate::jobs::key::{GroupMatcher, JobKey, Matcher, TriggerKey, DEFAULT_GROUP};
    pub use crate::jobs::listeners::{JobListener, SchedulerListener, TriggerListener};
    pub use crate::jobs::scheduler::{RescheduleOutcome, Scheduler};
    pub use crate::jobs::store::{InMemoryJobStore, JobStore};
    pub use crate::jobs::trigger::{
        CalendarIntervalTrigger, CompletionInstruction, CronTrigger, DailyTimeIntervalTrigger,
        MisfireInstruction, SimpleTrigger, Trigger, TriggerState,
    };
}
