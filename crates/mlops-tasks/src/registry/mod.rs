//! De-duplicated task observation.
//!
//! Several UI call sites may ask to follow the same backend task (an upload
//! started from one view, re-opened from another). The registry keeps at
//! most one poll per task id and drops the entry as soon as the task
//! settles.
//!
//! # Concurrency Model
//!
//! - One spawned `PollingScheduler` per tracked task, unbounded, fixed interval
//! - Each tick is scheduled only after the previous fetch settled, so fetches
//!   for one task never overlap
//! - Check-then-insert and settle-then-remove each run under a single lock
//!   acquisition; the lock is never held across an await
//! - Lease ids prevent a stale poll from removing (or notifying for) a newer
//!   subscription of the same task id

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mlops_core::{
    MlBackendPort, OperationsConfig, PollingConfig, Task, TaskError, TaskId, TaskObserver,
    TaskState,
};
use tokio_util::sync::CancellationToken;

use crate::polling::{PollOutcome, PollingScheduler};

/// Lease ID stamped on each registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

/// State for a tracked task.
struct ActiveTask {
    lease: LeaseId,
    cancel: CancellationToken,
}

/// Result of [`TaskObservationRegistry::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// A new poll was started; the given observer will be notified.
    Started,
    /// The task is already being polled. The first caller's observer keeps
    /// receiving callbacks; this caller's observer is dropped.
    AlreadyTracked,
    /// The registry was shut down and accepts no new queries.
    Closed,
}

/// What one fetched snapshot means for the subscription.
#[derive(Debug)]
enum Step {
    Pending,
    Completed,
    Failed(TaskError),
}

impl Step {
    fn of(task: &Task) -> Self {
        if let Some(error) = &task.error {
            return Self::Failed(TaskError::failed(error.clone()));
        }
        if task.result_model_id.is_some() {
            return Self::Completed;
        }
        match task.state {
            TaskState::Created | TaskState::Running => Self::Pending,
            TaskState::Completed => Self::Completed,
            state @ (TaskState::Failed | TaskState::Cancelled | TaskState::CompletedWithError) => {
                Self::Failed(TaskError::failed(format!("Task ended in state {state}")))
            }
        }
    }
}

/// Process-wide (but explicitly owned) index of tracked tasks.
///
/// Construct one per owning context and share it by `Arc`; tests build a
/// fresh registry per case.
pub struct TaskObservationRegistry {
    backend: Arc<dyn MlBackendPort>,
    interval: Duration,
    active: Mutex<HashMap<TaskId, ActiveTask>>,
    lease_counter: AtomicU64,
    shutdown: CancellationToken,
}

impl TaskObservationRegistry {
    /// Create a registry polling every `interval`.
    pub fn new(backend: Arc<dyn MlBackendPort>, interval: Duration) -> Self {
        Self {
            backend,
            interval,
            active: Mutex::new(HashMap::new()),
            lease_counter: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(backend: Arc<dyn MlBackendPort>, config: &OperationsConfig) -> Self {
        Self::new(backend, config.task_poll_interval)
    }

    fn active(&self) -> MutexGuard<'_, HashMap<TaskId, ActiveTask>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start following `task_id` unless it is already followed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn query(self: &Arc<Self>, task_id: TaskId, observer: Arc<dyn TaskObserver>) -> QueryOutcome {
        if self.shutdown.is_cancelled() {
            return QueryOutcome::Closed;
        }

        let (lease, cancel) = {
            let mut active = self.active();
            if active.contains_key(&task_id) {
                tracing::debug!(
                    target: "mlops.tasks",
                    task_id = %task_id,
                    "Task already tracked, ignoring duplicate query"
                );
                return QueryOutcome::AlreadyTracked;
            }
            let lease = LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed));
            let cancel = self.shutdown.child_token();
            active.insert(
                task_id.clone(),
                ActiveTask {
                    lease,
                    cancel: cancel.clone(),
                },
            );
            (lease, cancel)
        };

        tracing::debug!(target: "mlops.tasks", task_id = %task_id, "Tracking task");

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.follow(task_id, lease, observer, cancel).await;
        });

        QueryOutcome::Started
    }

    /// Stop tracking `task_id`. Safe to call any number of times.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, task_id: &TaskId) -> bool {
        let Some(entry) = self.active().remove(task_id) else {
            return false;
        };
        entry.cancel.cancel();
        tracing::debug!(target: "mlops.tasks", task_id = %task_id, "Task removed");
        true
    }

    pub fn is_tracked(&self, task_id: &TaskId) -> bool {
        self.active().contains_key(task_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.active().len()
    }

    /// Tear down every poll and refuse further queries.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<_> = self.active().drain().collect();
        tracing::debug!(
            target: "mlops.tasks",
            dropped = drained.len(),
            "Task registry shut down"
        );
    }

    /// Poll one task until it settles or its entry goes away.
    async fn follow(
        self: Arc<Self>,
        task_id: TaskId,
        lease: LeaseId,
        observer: Arc<dyn TaskObserver>,
        cancel: CancellationToken,
    ) {
        let checker = {
            let registry = Arc::clone(&self);
            let task_id = task_id.clone();
            let cancel = cancel.clone();
            move || {
                let registry = Arc::clone(&registry);
                let task_id = task_id.clone();
                let observer = Arc::clone(&observer);
                let cancel = cancel.clone();
                async move {
                    Ok::<_, Infallible>(
                        registry
                            .poll_once(&task_id, lease, observer.as_ref(), &cancel)
                            .await,
                    )
                }
            }
        };

        let mut scheduler =
            PollingScheduler::new(PollingConfig::unbounded(self.interval), checker)
                .with_cancellation(cancel);

        let outcome = match scheduler.start().await {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        };

        // A cancelled poll must not leave its entry behind.
        self.release(&task_id, lease);

        tracing::debug!(
            target: "mlops.tasks",
            task_id = %task_id,
            attempts = scheduler.attempts_made(),
            cancelled = outcome == PollOutcome::Cancelled,
            "Stopped tracking task"
        );
    }

    /// Fetch once and dispatch; returns whether to keep polling.
    async fn poll_once(
        &self,
        task_id: &TaskId,
        lease: LeaseId,
        observer: &dyn TaskObserver,
        cancel: &CancellationToken,
    ) -> bool {
        let result = self.backend.fetch_task(task_id).await;
        if cancel.is_cancelled() {
            return false;
        }

        let task = match result {
            Ok(task) => task,
            Err(err) => {
                tracing::warn!(
                    target: "mlops.tasks",
                    task_id = %task_id,
                    error = %err,
                    "Task status fetch failed"
                );
                let error = TaskError::from(err);
                self.settle(task_id, lease, || observer.on_error(&error));
                return false;
            }
        };

        match Step::of(&task) {
            Step::Pending => {
                observer.on_update(&task);
                true
            }
            Step::Completed => {
                tracing::info!(
                    target: "mlops.tasks",
                    task_id = %task_id,
                    result_model_id = task.result_model_id.as_deref().unwrap_or_default(),
                    "Task completed"
                );
                self.settle(task_id, lease, || {
                    observer.on_update(&task);
                    observer.on_complete(&task);
                });
                false
            }
            Step::Failed(error) => {
                tracing::info!(
                    target: "mlops.tasks",
                    task_id = %task_id,
                    error = %error,
                    "Task failed"
                );
                self.settle(task_id, lease, || observer.on_error(&error));
                false
            }
        }
    }

    /// Remove the entry and run `notify` only if the lease is still ours.
    fn settle(&self, task_id: &TaskId, lease: LeaseId, notify: impl FnOnce()) {
        if self.release(task_id, lease) {
            notify();
        } else {
            tracing::debug!(
                target: "mlops.tasks",
                task_id = %task_id,
                "Ignoring stale settlement (lease mismatch)"
            );
        }
    }

    /// Verify the lease matches and remove the entry.
    fn release(&self, task_id: &TaskId, lease: LeaseId) -> bool {
        let mut active = self.active();
        match active.get(task_id) {
            Some(entry) if entry.lease == lease => {
                active.remove(task_id);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for TaskObservationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskObservationRegistry")
            .field("interval", &self.interval)
            .field("tracked", &self.tracked_count())
            .field("closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
