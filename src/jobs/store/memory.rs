//! In-memory `JobStore`. Concurrency via a single `parking_lot::Mutex`
//! around the store's state: the store mediates every mutation through its
//! own mutex rather than relying on the caller to serialize access.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{JobStore, TriggerFiredBundle};
use crate::error::{Result, SchedulerError};
use crate::jobs::calendar::Calendar;
use crate::jobs::job::JobDetail;
use crate::jobs::key::{JobKey, Matcher, TriggerKey, DEFAULT_GROUP};
use crate::jobs::signaler::SchedulerSignaler;
use crate::jobs::trigger::{CompletionInstruction, MisfireInstruction, Trigger, TriggerState};

struct TriggerRecord {
    trigger: Box<dyn Trigger>,
    state: TriggerState,
}

#[derive(Default)]
struct StoreState {
    jobs: HashMap<JobKey, JobDetail>,
    triggers: HashMap<TriggerKey, TriggerRecord>,
    triggers_by_job: HashMap<JobKey, HashSet<TriggerKey>>,
    calendars: HashMap<String, Arc<dyn Calendar>>,
    paused_job_groups: HashSet<String>,
    paused_trigger_groups: HashSet<String>,
    /// Job currently executing under its non-concurrent policy, and which
    /// trigger is driving that execution.
    executing_jobs: HashMap<JobKey, TriggerKey>,
}

pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
    signaler: RwLock<Option<Arc<dyn SchedulerSignaler>>>,
    misfire_threshold: Duration,
}

impl InMemoryJobStore {
    pub fn new(misfire_threshold: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            signaler: RwLock::new(None),
            misfire_threshold,
        }
    }

    fn signaler(&self) -> Option<Arc<dyn SchedulerSignaler>> {
        self.signaler.read().clone()
    }

    fn calendar_for<'a>(
        state: &'a StoreState,
        name: Option<&str>,
    ) -> Option<&'a (dyn Calendar + 'static)> {
        name.and_then(|n| state.calendars.get(n)).map(|c| c.as_ref())
    }

    /// Apply this trigger's misfire instruction if its next fire time is
    /// older than the threshold. Returns whether a misfire was handled.
    fn apply_misfire_locked(state: &mut StoreState, key: &TriggerKey, now: DateTime<Utc>, threshold: Duration) -> bool {
        let Some(record) = state.triggers.get(key) else { return false };
        if record.state != TriggerState::Normal && record.state != TriggerState::Paused {
            return false;
        }
        let Some(next) = record.trigger.next_fire_time() else { return false };
        if record.trigger.misfire_instruction() == MisfireInstruction::IgnoreMisfirePolicy {
            return false;
        }
        if next >= now - threshold {
            return false;
        }

        let job_key = record.trigger.job_key().clone();
        let set_all_error = record.trigger.misfire_instruction() == MisfireInstruction::SetAllJobTriggersError;
        let calendar_name = record.trigger.calendar_name().map(|s| s.to_string());
        let calendar = Self::calendar_for(state, calendar_name.as_deref());
        if let Some(record) = state.triggers.get_mut(key) {
            record.trigger.update_after_misfire(calendar);
        }

        if set_all_error {
            if let Some(keys) = state.triggers_by_job.get(&job_key).cloned() {
                for peer in keys {
                    if let Some(r) = state.triggers.get_mut(&peer) {
                        r.state = TriggerState::Error;
                    }
                }
            }
        }
        true
    }

    fn recompute_state_for_new_trigger(state: &StoreState, trigger: &dyn Trigger) -> TriggerState {
        let group_paused = state.paused_trigger_groups.contains(trigger.key().group());
        let job_blocked = state.executing_jobs.contains_key(trigger.job_key());
        match (group_paused, job_blocked) {
            (true, true) => TriggerState::PausedAndBlocked,
            (true, false) => TriggerState::Paused,
            (false, true) => TriggerState::Blocked,
            (false, false) => TriggerState::Normal,
        }
    }

    fn insert_trigger_index(state: &mut StoreState, key: TriggerKey, job_key: JobKey) {
        state.triggers_by_job.entry(job_key).or_default().insert(key);
    }

    fn remove_trigger_index(state: &mut StoreState, key: &TriggerKey, job_key: &JobKey) {
        if let Some(set) = state.triggers_by_job.get_mut(job_key) {
            set.remove(key);
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn initialize(&self, signaler: Arc<dyn SchedulerSignaler>) {
        *self.signaler.write() = Some(signaler);
    }

    fn scheduler_started(&self) -> Result<()> {
        debug!("in-memory job store observed scheduler start");
        Ok(())
    }

    fn scheduler_paused(&self) {}

    fn scheduler_resumed(&self) {}

    #[instrument(skip(self, job, trigger), fields(job_key = %job.key, trigger_key = %trigger.key()))]
    fn store_job_and_trigger(&self, job: JobDetail, trigger: Box<dyn Trigger>) -> Result<()> {
        self.store_job(job, false, true)?;
        self.store_trigger(trigger, false)
    }

    fn store_job(&self, job: JobDetail, replace: bool, allow_non_durable: bool) -> Result<()> {
        let mut state = self.state.lock();
        if !replace && state.jobs.contains_key(&job.key) {
            return Err(SchedulerError::already_exists("job", job.key.to_string()));
        }
        if !job.durable && !allow_non_durable {
            let has_triggers = state
                .triggers_by_job
                .get(&job.key)
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if !has_triggers {
                return Err(SchedulerError::invalid_argument(format!(
                    "job '{}' is not durable and has no triggers; pass durable=true or allow_non_durable=true",
                    job.key
                )));
            }
        }
        state.jobs.insert(job.key.clone(), job);
        Ok(())
    }

    fn store_trigger(&self, trigger: Box<dyn Trigger>, replace: bool) -> Result<()> {
        let mut state = self.state.lock();
        let key = trigger.key().clone();
        if !replace && state.triggers.contains_key(&key) {
            return Err(SchedulerError::already_exists("trigger", key.to_string()));
        }
        if !state.jobs.contains_key(trigger.job_key()) {
            return Err(SchedulerError::not_found("job", trigger.job_key().to_string()));
        }
        let job_key = trigger.job_key().clone();
        let initial_state = Self::recompute_state_for_new_trigger(&state, trigger.as_ref());
        Self::insert_trigger_index(&mut state, key.clone(), job_key);
        state.triggers.insert(
            key,
            TriggerRecord {
                trigger,
                state: initial_state,
            },
        );
        if let Some(signaler) = self.signaler() {
            signaler.signal_scheduling_change(None);
        }
        Ok(())
    }

    fn remove_job(&self, key: &JobKey) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(trigger_keys) = state.triggers_by_job.remove(key) else {
            return Ok(state.jobs.remove(key).is_some());
        };
        for tk in &trigger_keys {
            state.triggers.remove(tk);
        }
        Ok(state.jobs.remove(key).is_some())
    }

    fn remove_trigger(&self, key: &TriggerKey) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(record) = state.triggers.remove(key) else {
            return Ok(false);
        };
        let job_key = record.trigger.job_key().clone();
        Self::remove_trigger_index(&mut state, key, &job_key);

        let remaining = state
            .triggers_by_job
            .get(&job_key)
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !remaining {
            if let Some(job) = state.jobs.get(&job_key) {
                if !job.durable {
                    state.jobs.remove(&job_key);
                    state.triggers_by_job.remove(&job_key);
                }
            }
        }
        Ok(true)
    }

    fn replace_trigger(&self, key: &TriggerKey, new_trigger: Box<dyn Trigger>) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(old) = state.triggers.get(key) else {
            return Ok(false);
        };
        if old.trigger.job_key() != new_trigger.job_key() {
            return Err(SchedulerError::invalid_argument(
                "replacement trigger must reference the same job",
            ));
        }
        let new_state = Self::recompute_state_for_new_trigger(&state, new_trigger.as_ref());
        let job_key = new_trigger.job_key().clone();
        Self::remove_trigger_index(&mut state, key, &job_key);
        Self::insert_trigger_index(&mut state, new_trigger.key().clone(), job_key);
        state.triggers.remove(key);
        state.triggers.insert(
            new_trigger.key().clone(),
            TriggerRecord {
                trigger: new_trigger,
                state: new_state,
            },
        );
        Ok(true)
    }

    fn pause_trigger(&self, key: &TriggerKey) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(record) = state.triggers.get_mut(key) {
            record.state = match record.state {
                TriggerState::Blocked | TriggerState::PausedAndBlocked => TriggerState::PausedAndBlocked,
                _ => TriggerState::Paused,
            };
        }
        Ok(())
    }

    fn pause_job(&self, key: &JobKey) -> Result<()> {
        let mut state = self.state.lock();
        let Some(trigger_keys) = state.triggers_by_job.get(key).cloned() else {
            return Ok(());
        };
        for tk in trigger_keys {
            if let Some(record) = state.triggers.get_mut(&tk) {
                record.state = match record.state {
                    TriggerState::Blocked | TriggerState::PausedAndBlocked => TriggerState::PausedAndBlocked,
                    _ => TriggerState::Paused,
                };
            }
        }
        Ok(())
    }

    fn pause_triggers(&self, matcher: &dyn Matcher<TriggerKey>) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let mut groups = HashSet::new();
        let matching: Vec<TriggerKey> = state
            .triggers
            .keys()
            .filter(|k| matcher.is_match(k))
            .cloned()
            .collect();
        for key in matching {
            groups.insert(key.group().to_string());
            if let Some(record) = state.triggers.get_mut(&key) {
                record.state = match record.state {
                    TriggerState::Blocked | TriggerState::PausedAndBlocked => TriggerState::PausedAndBlocked,
                    _ => TriggerState::Paused,
                };
            }
        }
        for group in &groups {
            state.paused_trigger_groups.insert(group.clone());
        }
        Ok(groups.into_iter().collect())
    }

    fn pause_jobs(&self, matcher: &dyn Matcher<JobKey>) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let mut groups = HashSet::new();
        let matching: Vec<JobKey> = state.jobs.keys().filter(|k| matcher.is_match(k)).cloned().collect();
        for job_key in &matching {
            groups.insert(job_key.group().to_string());
            if let Some(trigger_keys) = state.triggers_by_job.get(job_key).cloned() {
                for tk in trigger_keys {
                    if let Some(record) = state.triggers.get_mut(&tk) {
                        record.state = match record.state {
                            TriggerState::Blocked | TriggerState::PausedAndBlocked => TriggerState::PausedAndBlocked,
                            _ => TriggerState::Paused,
                        };
                    }
                }
            }
        }
        for group in &groups {
            state.paused_job_groups.insert(group.clone());
        }
        Ok(groups.into_iter().collect())
    }

    fn resume_trigger(&self, key: &TriggerKey) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(record) = state.triggers.get_mut(key) {
            record.state = match record.state {
                TriggerState::Paused => TriggerState::Normal,
                TriggerState::PausedAndBlocked => TriggerState::Blocked,
                other => other,
            };
        }
        Ok(())
    }

    fn resume_job(&self, key: &JobKey) -> Result<()> {
        let mut state = self.state.lock();
        let Some(trigger_keys) = state.triggers_by_job.get(key).cloned() else {
            return Ok(());
        };
        for tk in trigger_keys {
            if let Some(record) = state.triggers.get_mut(&tk) {
                record.state = match record.state {
                    TriggerState::Paused => TriggerState::Normal,
                    TriggerState::PausedAndBlocked => TriggerState::Blocked,
                    other => other,
                };
            }
        }
        Ok(())
    }

    fn resume_triggers(&self, matcher: &dyn Matcher<TriggerKey>) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let mut groups = HashSet::new();
        let matching: Vec<TriggerKey> = state
            .triggers
            .keys()
            .filter(|k| matcher.is_match(k))
            .cloned()
            .collect();
        for key in matching {
            groups.insert(key.group().to_string());
            if let Some(record) = state.triggers.get_mut(&key) {
                record.state = match record.state {
                    TriggerState::Paused => TriggerState::Normal,
                    TriggerState::PausedAndBlocked => TriggerState::Blocked,
                    other => other,
                };
            }
        }
        for group in &groups {
            state.paused_trigger_groups.remove(group);
        }
        Ok(groups.into_iter().collect())
    }

    fn resume_jobs(&self, matcher: &dyn Matcher<JobKey>) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let mut groups = HashSet::new();
        let matching: Vec<JobKey> = state.jobs.keys().filter(|k| matcher.is_match(k)).cloned().collect();
        for job_key in &matching {
            groups.insert(job_key.group().to_string());
            if let Some(trigger_keys) = state.triggers_by_job.get(job_key).cloned() {
                for tk in trigger_keys {
                    if let Some(record) = state.triggers.get_mut(&tk) {
                        record.state = match record.state {
                            TriggerState::Paused => TriggerState::Normal,
                            TriggerState::PausedAndBlocked => TriggerState::Blocked,
                            other => other,
                        };
                    }
                }
            }
        }
        for group in &groups {
            state.paused_job_groups.remove(group);
        }
        Ok(groups.into_iter().collect())
    }

    fn pause_all(&self) {
        let mut state = self.state.lock();
        let keys: Vec<TriggerKey> = state.triggers.keys().cloned().collect();
        for key in keys {
            if let Some(record) = state.triggers.get_mut(&key) {
                record.state = match record.state {
                    TriggerState::Blocked | TriggerState::PausedAndBlocked => TriggerState::PausedAndBlocked,
                    _ => TriggerState::Paused,
                };
            }
            state.paused_trigger_groups.insert(key.group().to_string());
        }
    }

    fn resume_all(&self) {
        let mut state = self.state.lock();
        state.paused_trigger_groups.clear();
        state.paused_job_groups.clear();
        let keys: Vec<TriggerKey> = state.triggers.keys().cloned().collect();
        for key in keys {
            if let Some(record) = state.triggers.get_mut(&key) {
                record.state = match record.state {
                    TriggerState::Paused => TriggerState::Normal,
                    TriggerState::PausedAndBlocked => TriggerState::Blocked,
                    other => other,
                };
            }
        }
    }

    fn get_trigger_state(&self, key: &TriggerKey) -> TriggerState {
        self.state
            .lock()
            .triggers
            .get(key)
            .map(|r| r.state)
            .unwrap_or(TriggerState::None)
    }

    fn clear_all_scheduling_data(&self) {
        let mut state = self.state.lock();
        *state = StoreState::default();
    }

    fn store_calendar(
        &self,
        name: &str,
        calendar: Arc<dyn Calendar>,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !replace && state.calendars.contains_key(name) {
            return Err(SchedulerError::already_exists("calendar", name));
        }
        state.calendars.insert(name.to_string(), calendar);
        if update_triggers {
            let keys: Vec<TriggerKey> = state
                .triggers
                .iter()
                .filter(|(_, r)| r.trigger.calendar_name() == Some(name))
                .map(|(k, _)| k.clone())
                .collect();
            let threshold = self.misfire_threshold;
            let calendar_ref = state.calendars.get(name).cloned();
            for key in keys {
                if let (Some(record), Some(calendar_ref)) = (state.triggers.get_mut(&key), &calendar_ref) {
                    record.trigger.update_with_new_calendar(Some(calendar_ref.as_ref()), threshold);
                }
            }
        }
        Ok(())
    }

    fn get_calendar(&self, name: &str) -> Option<Arc<dyn Calendar>> {
        self.state.lock().calendars.get(name).cloned()
    }

    #[instrument(skip(self))]
    fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: Duration,
    ) -> Result<Vec<Box<dyn Trigger>>> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let threshold = self.misfire_threshold;

        let normal_keys: Vec<TriggerKey> = state
            .triggers
            .iter()
            .filter(|(_, r)| r.state == TriggerState::Normal)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &normal_keys {
            Self::apply_misfire_locked(&mut state, key, now, threshold);
        }

        let candidate_cutoff = no_later_than + time_window;
        let mut candidates: Vec<(TriggerKey, DateTime<Utc>, i32)> = state
            .triggers
            .iter()
            .filter(|(_, r)| r.state == TriggerState::Normal)
            .filter_map(|(k, r)| r.trigger.next_fire_time().map(|t| (k.clone(), t, r.trigger.priority())))
            .filter(|(_, fire_time, _)| *fire_time <= candidate_cutoff)
            .collect();

        candidates.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then(b.2.cmp(&a.2))
                .then(a.0.group().cmp(b.0.group()))
                .then(a.0.name().cmp(b.0.name()))
        });

        let mut acquired = Vec::new();
        let mut jobs_in_batch: HashSet<JobKey> = HashSet::new();
        let mut window_anchor: Option<DateTime<Utc>> = None;

        for (key, fire_time, _) in candidates {
            if acquired.len() >= max_count {
                break;
            }
            if let Some(anchor) = window_anchor {
                if fire_time > anchor + time_window {
                    break;
                }
            }
            let job_key = state.triggers[&key].trigger.job_key().clone();
            let job_disallows_concurrency = state
                .jobs
                .get(&job_key)
                .map(|j| j.concurrent_execution_disallowed)
                .unwrap_or(false);
            if job_disallows_concurrency && jobs_in_batch.contains(&job_key) {
                continue;
            }

            if window_anchor.is_none() {
                window_anchor = Some(fire_time);
            }
            jobs_in_batch.insert(job_key);
            if let Some(record) = state.triggers.get_mut(&key) {
                record.state = TriggerState::Acquired;
                acquired.push(record.trigger.clone_box());
            }
        }

        Ok(acquired)
    }

    fn release_acquired_trigger(&self, trigger_key: &TriggerKey) {
        let mut state = self.state.lock();
        if let Some(record) = state.triggers.get_mut(trigger_key) {
            if record.state == TriggerState::Acquired {
                let group_paused = state.paused_trigger_groups.contains(trigger_key.group());
                record.state = if group_paused { TriggerState::Paused } else { TriggerState::Normal };
            }
        }
    }

    #[instrument(skip(self, trigger_keys))]
    fn triggers_fired(&self, trigger_keys: &[TriggerKey]) -> Vec<Option<TriggerFiredBundle>> {
        let mut state = self.state.lock();
        let mut out = Vec::with_capacity(trigger_keys.len());

        for key in trigger_keys {
            let bundle = (|| {
                let record = state.triggers.get(key)?;
                if record.state != TriggerState::Acquired {
                    return None;
                }
                let job_key = record.trigger.job_key().clone();
                let job_detail = state.jobs.get(&job_key)?.clone();
                let scheduled_fire_time = record.trigger.next_fire_time()?;
                let calendar_name = record.trigger.calendar_name().map(|s| s.to_string());
                let calendar = Self::calendar_for(&state, calendar_name.as_deref());

                let record = state.triggers.get_mut(key)?;
                record.trigger.trigger_fired(calendar);
                let previous_fire_time = record.trigger.previous_fire_time();
                let next_fire_time = record.trigger.next_fire_time();
                let fire_instance_id = uuid::Uuid::new_v4().to_string();
                let fire_time = Utc::now();
                let trigger_snapshot = record.trigger.clone_box();

                record.state = if next_fire_time.is_some() {
                    TriggerState::Normal
                } else {
                    TriggerState::Complete
                };

                if job_detail.concurrent_execution_disallowed {
                    state.executing_jobs.insert(job_key.clone(), key.clone());
                    if let Some(peers) = state.triggers_by_job.get(&job_key).cloned() {
                        for peer in peers {
                            if &peer == key {
                                continue;
                            }
                            if let Some(peer_record) = state.triggers.get_mut(&peer) {
                                peer_record.state = match peer_record.state {
                                    TriggerState::Paused => TriggerState::PausedAndBlocked,
                                    TriggerState::Normal | TriggerState::Acquired => TriggerState::Blocked,
                                    other => other,
                                };
                            }
                        }
                    }
                }

                Some(TriggerFiredBundle {
                    trigger: trigger_snapshot,
                    job_detail,
                    fire_instance_id,
                    fire_time,
                    scheduled_fire_time,
                    previous_fire_time,
                    next_fire_time,
                })
            })();

            if bundle.is_none() {
                if let Some(record) = state.triggers.get_mut(key) {
                    if record.state == TriggerState::Acquired {
                        record.state = TriggerState::Normal;
                    }
                }
            }
            out.push(bundle);
        }

        out
    }

    #[instrument(skip(self))]
    fn triggered_job_complete(&self, trigger_key: &TriggerKey, instruction: CompletionInstruction) {
        let mut state = self.state.lock();
        let Some(job_key) = state.triggers.get(trigger_key).map(|r| r.trigger.job_key().clone()) else {
            return;
        };

        match instruction {
            CompletionInstruction::Noop => {}
            CompletionInstruction::ReExecuteJob => {
                warn!("triggered_job_complete called with ReExecuteJob; this should be handled entirely by the run shell");
            }
            CompletionInstruction::DeleteTrigger => {
                state.triggers.remove(trigger_key);
                Self::remove_trigger_index(&mut state, trigger_key, &job_key);
            }
            CompletionInstruction::SetTriggerComplete => {
                if let Some(record) = state.triggers.get_mut(trigger_key) {
                    record.state = TriggerState::Complete;
                }
            }
            CompletionInstruction::SetTriggerError => {
                if let Some(record) = state.triggers.get_mut(trigger_key) {
                    record.state = TriggerState::Error;
                }
            }
            CompletionInstruction::SetAllJobTriggersComplete => {
                if let Some(keys) = state.triggers_by_job.get(&job_key).cloned() {
                    for key in keys {
                        if let Some(record) = state.triggers.get_mut(&key) {
                            record.state = TriggerState::Complete;
                        }
                    }
                }
            }
            CompletionInstruction::SetAllJobTriggersError => {
                if let Some(keys) = state.triggers_by_job.get(&job_key).cloned() {
                    for key in keys {
                        if let Some(record) = state.triggers.get_mut(&key) {
                            record.state = TriggerState::Error;
                        }
                    }
                }
            }
        }

        if state.executing_jobs.get(&job_key) == Some(trigger_key) {
            state.executing_jobs.remove(&job_key);
            if let Some(peers) = state.triggers_by_job.get(&job_key).cloned() {
                for peer in peers {
                    if let Some(peer_record) = state.triggers.get_mut(&peer) {
                        peer_record.state = match peer_record.state {
                            TriggerState::Blocked => TriggerState::Normal,
                            TriggerState::PausedAndBlocked => TriggerState::Paused,
                            other => other,
                        };
                    }
                }
            }
        }

        if let Some(signaler) = self.signaler() {
            if !state.triggers.contains_key(trigger_key) {
                signaler.notify_scheduler_listeners_finalized(trigger_key.clone());
            } else if matches!(
                state.triggers.get(trigger_key).map(|r| r.state),
                Some(TriggerState::Complete)
            ) {
                signaler.notify_scheduler_listeners_finalized(trigger_key.clone());
            }
        }
    }

    fn scan_misfires(&self) -> usize {
        let mut state = self.state.lock();
        let now = Utc::now();
        let threshold = self.misfire_threshold;
        let keys: Vec<TriggerKey> = state.triggers.keys().cloned().collect();
        let mut handled = 0;
        for key in keys {
            if Self::apply_misfire_locked(&mut state, &key, now, threshold) {
                handled += 1;
                if let Some(signaler) = self.signaler() {
                    signaler.notify_trigger_listeners_misfired(key);
                }
            }
        }
        handled
    }

    fn job_exists(&self, key: &JobKey) -> bool {
        self.state.lock().jobs.contains_key(key)
    }

    fn trigger_exists(&self, key: &TriggerKey) -> bool {
        self.state.lock().triggers.contains_key(key)
    }

    fn get_job_detail(&self, key: &JobKey) -> Option<JobDetail> {
        self.state.lock().jobs.get(key).cloned()
    }

    fn get_trigger_keys_for_job(&self, key: &JobKey) -> Vec<TriggerKey> {
        self.state
            .lock()
            .triggers_by_job
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{Job, JobContext};
    use crate::jobs::key::{GroupMatcher, JobKind};
    use crate::jobs::trigger::simple::SimpleTrigger;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Arc;

    struct NoopJob;

    #[async_trait]
    impl Job for NoopJob {
        async fn execute(&self, _context: &mut JobContext) -> Result<()> {
            Ok(())
        }
    }

    fn store() -> InMemoryJobStore {
        InMemoryJobStore::new(Duration::seconds(60))
    }

    fn durable_job(key: JobKey) -> JobDetail {
        JobDetail::builder(key, Arc::new(NoopJob)).durable(true).build()
    }

    #[test]
    fn acquisition_ordering_scenario() {
        // Spec §8 scenario 1.
        let store = store();
        let job_key = JobKey::new("job1");
        store.store_job(durable_job(job_key.clone()), false, false).unwrap();

        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut t1 = SimpleTrigger::once(TriggerKey::in_group("trigger1", "group1"), job_key.clone(), base + Duration::seconds(200));
        let mut t2 = SimpleTrigger::once(TriggerKey::in_group("trigger2", "group1"), job_key.clone(), base + Duration::seconds(50));
        let mut t3 = SimpleTrigger::once(TriggerKey::in_group("trigger3", "group2"), job_key.clone(), base + Duration::seconds(100));
        t1.compute_first_fire_time(None);
        t2.compute_first_fire_time(None);
        t3.compute_first_fire_time(None);
        store.store_trigger(Box::new(t1), false).unwrap();
        store.store_trigger(Box::new(t2), false).unwrap();
        store.store_trigger(Box::new(t3), false).unwrap();

        let no_later_than = base + Duration::seconds(210);
        let first = store.acquire_next_triggers(no_later_than, 1, Duration::zero()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].key().name(), "trigger2");

        let second = store.acquire_next_triggers(no_later_than, 1, Duration::zero()).unwrap();
        assert_eq!(second[0].key().name(), "trigger3");

        let third = store.acquire_next_triggers(no_later_than, 1, Duration::zero()).unwrap();
        assert_eq!(third[0].key().name(), "trigger1");

        let fourth = store.acquire_next_triggers(no_later_than, 1, Duration::zero()).unwrap();
        assert!(fourth.is_empty());
    }

    #[test]
    fn pause_group_affects_future_triggers() {
        // Spec §8 scenario 3.
        let store = store();
        store.pause_jobs(&GroupMatcher::<JobKind>::group_equals("G")).unwrap();

        let job_key = JobKey::in_group("j2", "G");
        store
            .store_job(
                JobDetail::builder(job_key.clone(), Arc::new(NoopJob))
                    .durable(true)
                    .build(),
                false,
                false,
            )
            .unwrap();

        let trigger_key = TriggerKey::in_group("t", "TG");
        let mut trigger = SimpleTrigger::once(trigger_key.clone(), job_key, Utc::now());
        trigger.compute_first_fire_time(None);
        store.store_trigger(Box::new(trigger), false).unwrap();

        assert_eq!(store.get_trigger_state(&trigger_key), TriggerState::Paused);
    }

    #[test]
    fn non_durable_job_is_removed_with_last_trigger() {
        let store = store();
        let job_key = JobKey::new("j1");
        store
            .store_job(
                JobDetail::builder(job_key.clone(), Arc::new(NoopJob)).build(),
                false,
                true,
            )
            .unwrap();
        let trigger_key = TriggerKey::new("t1");
        let mut trigger = SimpleTrigger::once(trigger_key.clone(), job_key.clone(), Utc::now());
        trigger.compute_first_fire_time(None);
        store.store_trigger(Box::new(trigger), false).unwrap();

        store.remove_trigger(&trigger_key).unwrap();
        assert!(!store.job_exists(&job_key));
    }

    #[test]
    fn non_durable_job_without_triggers_rejected_by_default() {
        let store = store();
        let job_key = JobKey::new("j1");
        let err = store
            .store_job(
                JobDetail::builder(job_key, Arc::new(NoopJob)).build(),
                false,
                false,
            )
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn duplicate_store_without_replace_fails() {
        let store = store();
        let job_key = JobKey::new("j1");
        store.store_job(durable_job(job_key.clone()), false, false).unwrap();
        let err = store.store_job(durable_job(job_key), false, false).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ObjectAlreadyExists);
    }

    #[test]
    fn non_concurrent_job_blocks_peer_triggers_on_fire() {
        let store = store();
        let job_key = JobKey::new("j1");
        store
            .store_job(
                JobDetail::builder(job_key.clone(), Arc::new(NoopJob))
                    .durable(true)
                    .disallow_concurrent_execution(true)
                    .build(),
                false,
                false,
            )
            .unwrap();

        let t1_key = TriggerKey::new("t1");
        let t2_key = TriggerKey::new("t2");
        let now = Utc::now();
        let mut t1 = SimpleTrigger::once(t1_key.clone(), job_key.clone(), now - Duration::seconds(1));
        let mut t2 = SimpleTrigger::once(t2_key.clone(), job_key.clone(), now - Duration::seconds(1));
        t1.compute_first_fire_time(None);
        t2.compute_first_fire_time(None);
        store.store_trigger(Box::new(t1), false).unwrap();
        store.store_trigger(Box::new(t2), false).unwrap();

        let acquired = store.acquire_next_triggers(now, 10, Duration::zero()).unwrap();
        assert_eq!(acquired.len(), 1);
        let fired_key = acquired[0].key().clone();
        let fired = store.triggers_fired(&[fired_key.clone()]);
        assert!(fired[0].is_some());

        let other_key = if fired_key == t1_key { t2_key.clone() } else { t1_key.clone() };
        assert_eq!(store.get_trigger_state(&other_key), TriggerState::Blocked);

        store.triggered_job_complete(&fired_key, CompletionInstruction::SetTriggerComplete);
        assert_eq!(store.get_trigger_state(&other_key), TriggerState::Normal);
    }
}
