//! `SchedulerSignaler`: the narrow callback surface from the store back to
//! the scheduler thread and the listener bus (spec §4.3). Keeping this
//! narrow is what resolves the cyclic reference between store, scheduler
//! thread, and scheduler facade (spec §9): the store only ever holds a
//! `Arc<dyn SchedulerSignaler>`, never a handle to the scheduler itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};

use crate::jobs::key::{JobKey, TriggerKey};

/// A signal the scheduler thread's monitor can react to, or a listener
/// notification routed through the same channel so ordering between "the
/// store changed" and "tell the listeners about it" is preserved.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Wake the scheduler thread; a candidate new next-fire-time, or `None`
    /// if unknown (spec §4.3: "parameter is 0 if unknown").
    SchedulingChange(Option<DateTime<Utc>>),
    TriggerMisfired(TriggerKey),
    TriggerFinalized(TriggerKey),
    JobDeleted(JobKey),
    SchedulerError(String),
}

#[async_trait]
pub trait SchedulerSignaler: Send + Sync {
    fn signal_scheduling_change(&self, candidate_new_next_fire_time: Option<DateTime<Utc>>);
    fn notify_trigger_listeners_misfired(&self, trigger: TriggerKey);
    fn notify_scheduler_listeners_finalized(&self, trigger: TriggerKey);
    fn notify_scheduler_listeners_job_deleted(&self, job: JobKey);
    fn notify_scheduler_listeners_error(&self, message: String);
}

/// Channel-backed `SchedulerSignaler`. The scheduler thread drains `rx` in
/// its monitor-wait loop; the `Notify` lets it wake immediately rather than
/// waiting for its next poll, mirroring the "monitor-protected signal
/// record" of spec §5.
pub struct ChannelSignaler {
    tx: mpsc::UnboundedSender<Signal>,
    notify: std::sync::Arc<Notify>,
}

impl ChannelSignaler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Signal>, std::sync::Arc<Notify>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notify = std::sync::Arc::new(Notify::new());
        (
            Self {
                tx,
                notify: std::sync::Arc::clone(&notify),
            },
            rx,
            notify,
        )
    }

    fn send(&self, signal: Signal) {
        // The receiver only ever drops when the scheduler thread has
        // already shut down; a failed send is not itself an error this
        // caller needs to surface.
        let _ = self.tx.send(signal);
        self.notify.notify_one();
    }
}

#[async_trait]
impl SchedulerSignaler for ChannelSignaler {
    fn signal_scheduling_change(&self, candidate_new_next_fire_time: Option<DateTime<Utc>>) {
        self.send(Signal::SchedulingChange(candidate_new_next_fire_time));
    }

    fn notify_trigger_listeners_misfired(&self, trigger: TriggerKey) {
        self.send(Signal::TriggerMisfired(trigger));
    }

    fn notify_scheduler_listeners_finalized(&self, trigger: TriggerKey) {
        self.send(Signal::TriggerFinalized(trigger));
    }

    fn notify_scheduler_listeners_job_deleted(&self, job: JobKey) {
        self.send(Signal::JobDeleted(job));
    }

    fn notify_scheduler_listeners_error(&self, message: String) {
        self.send(Signal::SchedulerError(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_is_received() {
        let (signaler, mut rx, _notify) = ChannelSignaler::new();
        signaler.signal_scheduling_change(None);
        let signal = rx.recv().await.unwrap();
        assert!(matches!(signal, Signal::SchedulingChange(None)));
    }
}
