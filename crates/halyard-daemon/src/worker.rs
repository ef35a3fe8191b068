//! Per-subsystem worker
//!
//! Each enabled subsystem gets one worker task, so passes for the same
//! subsystem never overlap. Triggers arriving during a pass coalesce into a
//! single follow-up pass.

use halyard_apply::{PassContext, TriggerCause};
use halyard_control::SubsystemController;
use halyard_types::SubsystemId;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

/// Wakes a worker; cloneable through `Arc`
#[derive(Debug, Default)]
pub struct WorkerHandle {
    notify: Notify,
    pending: Mutex<Option<TriggerCause>>,
}

impl WorkerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pass. Only the latest cause of a burst is kept.
    pub fn trigger(&self, cause: TriggerCause) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(cause);
        }
        self.notify.notify_one();
    }

    /// Take the pending cause, if any
    pub fn take(&self) -> Option<TriggerCause> {
        self.pending.lock().ok().and_then(|mut pending| pending.take())
    }

    /// Wait for the next requested pass.
    ///
    /// A trigger consumed by `take` mid-pass still leaves its wakeup permit
    /// behind; wakeups without a pending cause are skipped.
    pub async fn next(&self) -> TriggerCause {
        loop {
            self.notify.notified().await;
            if let Some(cause) = self.take() {
                return cause;
            }
        }
    }
}

pub struct Worker {
    controller: SubsystemController,
    handle: Arc<WorkerHandle>,
    resync: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub fn new(
        controller: SubsystemController,
        handle: Arc<WorkerHandle>,
        resync: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            controller,
            handle,
            resync,
            shutdown,
        }
    }

    pub fn subsystem(&self) -> SubsystemId {
        self.controller.subsystem()
    }

    /// Run passes until shutdown; returns the controller for inspection
    pub async fn run(mut self) -> SubsystemController {
        let subsystem = self.subsystem();
        info!(subsystem = %subsystem, "Worker started");

        let mut cause = TriggerCause::Manual;
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let ctx = PassContext::new(subsystem, cause);
            let requeue = tokio::select! {
                outcome = self.controller.reconcile(&ctx) => outcome.requeue_after(),
                _ = self.shutdown.changed() => break,
            };

            // A trigger that arrived mid-pass runs next without waiting
            if let Some(pending) = self.handle.take() {
                cause = pending;
                continue;
            }

            let (delay, timer_cause) = match requeue {
                Some(delay) => (delay, TriggerCause::Retry),
                None => (self.resync, TriggerCause::Resync),
            };
            debug!(subsystem = %subsystem, delay_ms = delay.as_millis() as u64, "Worker idle");

            cause = tokio::select! {
                cause = self.handle.next() => cause,
                _ = tokio::time::sleep(delay) => timer_cause,
                _ = self.shutdown.changed() => break,
            };
        }

        info!(subsystem = %subsystem, "Worker stopped");
        self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halyard_control::{ControlSettings, Orchestrator};
    use halyard_store::{InMemoryStore, StoreOp};
    use halyard_types::{ArtifactKey, Kind};

    fn record_reads(store: &InMemoryStore, subsystem: SubsystemId) -> usize {
        let key = subsystem.record_key();
        store
            .calls_of(StoreOp::Get)
            .into_iter()
            .filter(|k| *k == key)
            .count()
    }

    #[test]
    fn test_triggers_coalesce_to_latest() {
        let handle = WorkerHandle::new();
        handle.trigger(TriggerCause::RecordChanged);
        handle.trigger(TriggerCause::Resync);
        assert_eq!(handle.take(), Some(TriggerCause::Resync));
        assert_eq!(handle.take(), None);
    }

    #[tokio::test]
    async fn test_trigger_wakes_waiter() {
        let handle = Arc::new(WorkerHandle::new());
        let key = ArtifactKey::cluster(Kind::LogStorage, "tigera-secure");

        let waiter = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                handle.notify.notified().await;
                handle.take()
            })
        };
        handle.trigger(TriggerCause::DependencyChanged(key.clone()));

        let cause = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cause, Some(TriggerCause::DependencyChanged(key)));
    }

    #[tokio::test]
    async fn test_consumed_trigger_does_not_wake_idle_wait() {
        let handle = WorkerHandle::new();
        handle.trigger(TriggerCause::RecordChanged);
        assert_eq!(handle.take(), Some(TriggerCause::RecordChanged));

        let woke = tokio::time::timeout(Duration::from_millis(50), handle.next()).await;
        assert!(woke.is_err());
    }

    #[tokio::test]
    async fn test_trigger_during_pass_runs_exactly_one_follow_up() {
        let store = Arc::new(InMemoryStore::new());
        let mut orchestrator = Orchestrator::new(store.clone(), ControlSettings::default());
        orchestrator.retain(&[SubsystemId::ClusterConnection]);
        let controller = orchestrator.into_controllers().remove(0);

        // Pending when the first pass ends, as if it arrived mid-pass
        let handle = Arc::new(WorkerHandle::new());
        handle.trigger(TriggerCause::RecordChanged);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Worker::new(controller, Arc::clone(&handle), Duration::from_secs(3600), shutdown_rx);
        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        // Startup pass plus one follow-up; the record is absent so each
        // pass is a single read
        assert_eq!(record_reads(&store, SubsystemId::ClusterConnection), 2);
    }
}
