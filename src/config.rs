//! Scheduler configuration.
//!
//! Every knob here corresponds to a scheduler-construction option: thread
//! pool sizing, the batching window used when acquiring triggers, misfire
//! and idle-wait thresholds, and shutdown behavior. Loaded from environment
//! variables (prefixed `CHRONOFORGE`, double-underscore separated) layered
//! over an optional file.

use serde::Deserialize;
use std::time::Duration;

/// Top-level scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Human-readable scheduler name, used in logs and thread names.
    #[serde(default = "default_scheduler_name")]
    pub scheduler_name: String,

    /// Unique instance id. Only matters once clustering exists; carried now
    /// so a future persistent `JobStore` can stamp acquired triggers with it.
    #[serde(default = "default_instance_id")]
    pub scheduler_instance_id: String,

    /// Worker pool configuration.
    #[serde(default)]
    pub thread_pool: ThreadPoolConfig,

    /// How far into the future the scheduler thread is willing to look when
    /// batching triggers together in one `acquire_next_triggers` call.
    #[serde(default = "default_batch_time_window", with = "humantime_serde")]
    pub batch_time_window: Duration,

    /// Maximum number of triggers acquired in a single batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// How long the scheduler thread sleeps when no trigger is due, absent a
    /// nearer wake-up target.
    #[serde(default = "default_idle_wait_time", with = "humantime_serde")]
    pub idle_wait_time: Duration,

    /// A trigger whose fire time has passed by more than this is misfired.
    #[serde(default = "default_misfire_threshold", with = "humantime_serde")]
    pub misfire_threshold: Duration,

    /// Whether `shutdown` interrupts interruptible jobs that are still
    /// running.
    #[serde(default)]
    pub interrupt_jobs_on_shutdown: bool,

    /// Whether shutdown should additionally wait for interrupted jobs to
    /// observe the interrupt and return before `shutdown` itself returns.
    #[serde(default)]
    pub interrupt_jobs_on_shutdown_with_wait: bool,

    /// Whether the scheduler's main thread is spawned as a daemon-equivalent
    /// (detached, doesn't keep the async runtime alive on its own).
    #[serde(default = "default_true")]
    pub make_scheduler_thread_daemon: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: default_scheduler_name(),
            scheduler_instance_id: default_instance_id(),
            thread_pool: ThreadPoolConfig::default(),
            batch_time_window: default_batch_time_window(),
            max_batch_size: default_max_batch_size(),
            idle_wait_time: default_idle_wait_time(),
            misfire_threshold: default_misfire_threshold(),
            interrupt_jobs_on_shutdown: false,
            interrupt_jobs_on_shutdown_with_wait: false,
            make_scheduler_thread_daemon: default_true(),
        }
    }
}

/// Worker pool sizing and scheduling hints.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadPoolConfig {
    /// Number of concurrent job executions allowed.
    #[serde(default = "default_pool_size")]
    pub size: usize,

    /// Relative OS thread priority hint for worker tasks. The tokio executor
    /// gives no per-task priority control, so this is advisory only and
    /// surfaced in logs rather than acted on.
    #[serde(default = "default_thread_priority")]
    pub thread_priority: u8,

    /// Whether worker tasks are daemon-equivalent (don't block process exit).
    #[serde(default = "default_true")]
    pub daemon: bool,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            thread_priority: default_thread_priority(),
            daemon: default_true(),
        }
    }
}

fn default_scheduler_name() -> String {
    "ChronoForgeScheduler".to_string()
}

fn default_instance_id() -> String {
    format!("instance-{}", uuid::Uuid::new_v4())
}

fn default_pool_size() -> usize {
    10
}

fn default_thread_priority() -> u8 {
    5
}

fn default_batch_time_window() -> Duration {
    Duration::ZERO
}

fn default_max_batch_size() -> usize {
    1
}

fn default_idle_wait_time() -> Duration {
    Duration::from_secs(30)
}

fn default_misfire_threshold() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

impl SchedulerConfig {
    /// Load configuration from environment and an optional config file.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CHRONOFORGE").separator("__"))
            .build()?;

        let cfg: SchedulerConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment variables still
    /// layered on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CHRONOFORGE").separator("__"))
            .build()?;

        let cfg: SchedulerConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}
