//! Listener plumbing: job/trigger/scheduler listener registries, each keyed
//! by self-reported name with an ordered list of matchers (spec §4.9).
//!
//! Recast per spec §9 as capability sets with default no-op methods rather
//! than the source's class-hierarchy "listener support" base classes -
//! nothing here requires inheritance, only a trait with defaulted methods.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::jobs::job::JobContext;
use crate::jobs::key::{JobKey, Matcher, TriggerKey};
use crate::jobs::trigger::CompletionInstruction;

/// Observes job execution. All methods are advisory no-ops by default so an
/// implementor only overrides what it cares about.
#[async_trait]
pub trait JobListener: Send + Sync {
    fn name(&self) -> &str;

    async fn job_to_be_executed(&self, _job_key: &JobKey, _context: &JobContext) {}
    async fn job_execution_vetoed(&self, _job_key: &JobKey, _context: &JobContext) {}
    async fn job_was_executed(
        &self,
        _job_key: &JobKey,
        _context: &JobContext,
        _result: &crate::error::Result<()>,
    ) {
    }
}

/// Observes trigger firing and completion; may veto a fire.
#[async_trait]
pub trait TriggerListener: Send + Sync {
    fn name(&self) -> &str;

    async fn trigger_fired(&self, _trigger_key: &TriggerKey, _context: &JobContext) {}

    /// Return `true` to veto this fire (the job body never runs).
    async fn veto_job_execution(&self, _trigger_key: &TriggerKey, _context: &JobContext) -> bool {
        false
    }

    async fn trigger_misfired(&self, _trigger_key: &TriggerKey) {}

    async fn trigger_complete(
        &self,
        _trigger_key: &TriggerKey,
        _context: &JobContext,
        _instruction: CompletionInstruction,
    ) {
    }
}

/// Observes scheduler-wide lifecycle events.
#[async_trait]
pub trait SchedulerListener: Send + Sync {
    fn name(&self) -> &str;

    async fn scheduler_started(&self) {}
    async fn scheduler_paused(&self) {}
    async fn scheduler_resumed(&self) {}
    async fn scheduler_shutdown(&self) {}
    async fn trigger_finalized(&self, _trigger_key: &TriggerKey) {}
    async fn job_deleted(&self, _job_key: &JobKey) {}
    async fn scheduler_error(&self, _message: &str) {}
}

struct MatchedListener<L: ?Sized> {
    listener: Arc<L>,
    matchers: Vec<Arc<dyn Matcher<JobKey>>>,
}

struct MatchedTriggerListener {
    listener: Arc<dyn TriggerListener>,
    matchers: Vec<Arc<dyn Matcher<TriggerKey>>>,
}

fn matches_any<T>(matchers: &[Arc<dyn Matcher<T>>], candidate: &T) -> bool {
    matchers.is_empty() || matchers.iter().any(|m| m.is_match(candidate))
}

/// Registry of job, trigger, and scheduler listeners plus a parallel
/// "internal" set the scheduler uses for its own bookkeeping listeners
/// (spec §4.9: "plus an internal parallel set used by the scheduler
/// itself").
#[derive(Default)]
pub struct ListenerManager {
    job_listeners: RwLock<HashMap<String, MatchedListener<dyn JobListener>>>,
    internal_job_listeners: RwLock<HashMap<String, MatchedListener<dyn JobListener>>>,
    trigger_listeners: RwLock<HashMap<String, MatchedTriggerListener>>,
    internal_trigger_listeners: RwLock<HashMap<String, MatchedTriggerListener>>,
    scheduler_listeners: RwLock<Vec<Arc<dyn SchedulerListener>>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job_listener(&self, listener: Arc<dyn JobListener>, matchers: Vec<Arc<dyn Matcher<JobKey>>>) {
        self.job_listeners.write().insert(
            listener.name().to_string(),
            MatchedListener { listener, matchers },
        );
    }

    pub fn add_internal_job_listener(&self, listener: Arc<dyn JobListener>) {
        self.internal_job_listeners.write().insert(
            listener.name().to_string(),
            MatchedListener {
                listener,
                matchers: Vec::new(),
            },
        );
    }

    pub fn remove_job_listener(&self, name: &str) -> bool {
        self.job_listeners.write().remove(name).is_some()
    }

    pub fn job_listener_names(&self) -> Vec<String> {
        self.job_listeners.read().keys().cloned().collect()
    }

    pub fn add_trigger_listener(
        &self,
        listener: Arc<dyn TriggerListener>,
        matchers: Vec<Arc<dyn Matcher<TriggerKey>>>,
    ) {
        self.trigger_listeners.write().insert(
            listener.name().to_string(),
            MatchedTriggerListener { listener, matchers },
        );
    }

    pub fn add_internal_trigger_listener(&self, listener: Arc<dyn TriggerListener>) {
        self.internal_trigger_listeners.write().insert(
            listener.name().to_string(),
            MatchedTriggerListener {
                listener,
                matchers: Vec::new(),
            },
        );
    }

    pub fn remove_trigger_listener(&self, name: &str) -> bool {
        self.trigger_listeners.write().remove(name).is_some()
    }

    pub fn trigger_listener_names(&self) -> Vec<String> {
        self.trigger_listeners.read().keys().cloned().collect()
    }

    pub fn add_scheduler_listener(&self, listener: Arc<dyn SchedulerListener>) {
        self.scheduler_listeners.write().push(listener);
    }

    pub fn remove_scheduler_listener(&self, name: &str) -> bool {
        let mut listeners = self.scheduler_listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.name() != name);
        listeners.len() != before
    }

    /// Replace the matcher list for an existing trigger listener.
    pub fn set_trigger_listener_matchers(&self, name: &str, matchers: Vec<Arc<dyn Matcher<TriggerKey>>>) -> bool {
        if let Some(entry) = self.trigger_listeners.write().get_mut(name) {
            entry.matchers = matchers;
            true
        } else {
            false
        }
    }

    /// Notify every matching trigger listener (external, then internal) of
    /// a fire, returning `true` if any vetoed. A listener error is reported
    /// to scheduler listeners and does not abort peer listeners (spec §4.7:
    /// "a listener exception is reported... but does not abort subsequent
    /// listeners").
    pub async fn notify_trigger_fired(&self, trigger_key: &TriggerKey, context: &JobContext) -> bool {
        let mut vetoed = false;
        for entry in self.internal_trigger_listeners.read().values() {
            entry.listener.trigger_fired(trigger_key, context).await;
        }
        let snapshot: Vec<_> = self
            .trigger_listeners
            .read()
            .values()
            .filter(|e| matches_any(&e.matchers, trigger_key))
            .map(|e| Arc::clone(&e.listener))
            .collect();
        for listener in snapshot {
            listener.trigger_fired(trigger_key, context).await;
            if listener.veto_job_execution(trigger_key, context).await {
                vetoed = true;
            }
        }
        vetoed
    }

    pub async fn notify_trigger_misfired(&self, trigger_key: &TriggerKey) {
        let snapshot: Vec<_> = self
            .trigger_listeners
            .read()
            .values()
            .filter(|e| matches_any(&e.matchers, trigger_key))
            .map(|e| Arc::clone(&e.listener))
            .collect();
        for listener in snapshot {
            listener.trigger_misfired(trigger_key).await;
        }
    }

    pub async fn notify_trigger_complete(
        &self,
        trigger_key: &TriggerKey,
        context: &JobContext,
        instruction: CompletionInstruction,
    ) {
        let snapshot: Vec<_> = self
            .trigger_listeners
            .read()
            .values()
            .filter(|e| matches_any(&e.matchers, trigger_key))
            .map(|e| Arc::clone(&e.listener))
            .collect();
        for listener in snapshot {
            listener.trigger_complete(trigger_key, context, instruction).await;
        }
    }

    pub async fn notify_job_to_be_executed(&self, job_key: &JobKey, context: &JobContext) {
        let snapshot: Vec<_> = self
            .job_listeners
            .read()
            .values()
            .filter(|e| matches_any(&e.matchers, job_key))
            .map(|e| Arc::clone(&e.listener))
            .collect();
        for listener in snapshot {
            listener.job_to_be_executed(job_key, context).await;
        }
    }

    pub async fn notify_job_execution_vetoed(&self, job_key: &JobKey, context: &JobContext) {
        let snapshot: Vec<_> = self
            .job_listeners
            .read()
            .values()
            .filter(|e| matches_any(&e.matchers, job_key))
            .map(|e| Arc::clone(&e.listener))
            .collect();
        for listener in snapshot {
            listener.job_execution_vetoed(job_key, context).await;
        }
    }

    pub async fn notify_job_was_executed(
        &self,
        job_key: &JobKey,
        context: &JobContext,
        result: &crate::error::Result<()>,
    ) {
        let snapshot: Vec<_> = self
            .job_listeners
            .read()
            .values()
            .filter(|e| matches_any(&e.matchers, job_key))
            .map(|e| Arc::clone(&e.listener))
            .collect();
        for listener in snapshot {
            listener.job_was_executed(job_key, context, result).await;
        }
    }

    pub async fn notify_scheduler_error(&self, message: &str) {
        warn!(message, "scheduler error reported to listeners");
        let snapshot: Vec<_> = self.scheduler_listeners.read().iter().cloned().collect();
        for listener in snapshot {
            listener.scheduler_error(message).await;
        }
    }

    pub async fn notify_trigger_finalized(&self, trigger_key: &TriggerKey) {
        let snapshot: Vec<_> = self.scheduler_listeners.read().iter().cloned().collect();
        for listener in snapshot {
            listener.trigger_finalized(trigger_key).await;
        }
    }

    pub async fn notify_job_deleted(&self, job_key: &JobKey) {
        let snapshot: Vec<_> = self.scheduler_listeners.read().iter().cloned().collect();
        for listener in snapshot {
            listener.job_deleted(job_key).await;
        }
    }

    pub async fn notify_scheduler_started(&self) {
        let snapshot: Vec<_> = self.scheduler_listeners.read().iter().cloned().collect();
        for listener in snapshot {
            listener.scheduler_started().await;
        }
    }

    pub async fn notify_scheduler_paused(&self) {
        let snapshot: Vec<_> = self.scheduler_listeners.read().iter().cloned().collect();
        for listener in snapshot {
            listener.scheduler_paused().await;
        }
    }

    pub async fn notify_scheduler_resumed(&self) {
        let snapshot: Vec<_> = self.scheduler_listeners.read().iter().cloned().collect();
        for listener in snapshot {
            listener.scheduler_resumed().await;
        }
    }

    pub async fn notify_scheduler_shutdown(&self) {
        let snapshot: Vec<_> = self.scheduler_listeners.read().iter().cloned().collect();
        for listener in snapshot {
            listener.scheduler_shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobDataMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTriggerListener {
        fired: AtomicUsize,
        veto: bool,
    }

    #[async_trait]
    impl TriggerListener for CountingTriggerListener {
        fn name(&self) -> &str {
            "counting"
        }

        async fn trigger_fired(&self, _trigger_key: &TriggerKey, _context: &JobContext) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }

        async fn veto_job_execution(&self, _trigger_key: &TriggerKey, _context: &JobContext) -> bool {
            self.veto
        }
    }

    #[tokio::test]
    async fn veto_is_reported_and_fired_count_increments() {
        let manager = ListenerManager::new();
        let listener = Arc::new(CountingTriggerListener {
            fired: AtomicUsize::new(0),
            veto: true,
        });
        manager.add_trigger_listener(listener.clone(), Vec::new());

        let trigger_key = TriggerKey::new("t1");
        let context = JobContext::new(JobKey::new("j1"), "fire-1".to_string(), JobDataMap::new());
        let vetoed = manager.notify_trigger_fired(&trigger_key, &context).await;
        assert!(vetoed);
        assert_eq!(listener.fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_outside_matcher_scope_is_skipped() {
        let manager = ListenerManager::new();
        let listener = Arc::new(CountingTriggerListener {
            fired: AtomicUsize::new(0),
            veto: false,
        });
        let matcher: Arc<dyn Matcher<TriggerKey>> =
            Arc::new(crate::jobs::key::GroupMatcher::group_equals("other-group"));
        manager.add_trigger_listener(listener.clone(), vec![matcher]);

        let trigger_key = TriggerKey::new("t1"); // DEFAULT group
        let context = JobContext::new(JobKey::new("j1"), "fire-1".to_string(), JobDataMap::new());
        manager.notify_trigger_fired(&trigger_key, &context).await;
        assert_eq!(listener.fired.load(Ordering::SeqCst), 0);
    }
}
