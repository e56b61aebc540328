//! Task observer port.
//!
//! Observers receive the snapshots produced while a task is being followed.
//! Every method has a no-op default so callers implement only what they
//! render.

use std::fmt;

use crate::domain::Task;
use crate::errors::TaskError;

/// Callbacks fired while a task is followed to settlement.
///
/// For a single observation the sequence is any number of `on_update`
/// calls followed by at most one of `on_complete` or `on_error`.
pub trait TaskObserver: Send + Sync {
    /// A fresh snapshot was fetched.
    fn on_update(&self, _task: &Task) {}

    /// The task settled successfully.
    fn on_complete(&self, _task: &Task) {}

    /// The task failed or could not be fetched.
    fn on_error(&self, _error: &TaskError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TaskObserver for NoopObserver {}

type TaskFn = Box<dyn Fn(&Task) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&TaskError) + Send + Sync>;

/// Closure-backed observer with optional callbacks.
///
/// ```
/// use mlops_core::TaskCallbacks;
///
/// let observer = TaskCallbacks::new()
///     .with_complete(|task| println!("model {:?} ready", task.result_model_id))
///     .with_error(|err| eprintln!("{err}"));
/// # let _ = observer;
/// ```
#[derive(Default)]
pub struct TaskCallbacks {
    on_update: Option<TaskFn>,
    on_complete: Option<TaskFn>,
    on_error: Option<ErrorFn>,
}

impl TaskCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_update(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_complete(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_error(mut self, f: impl Fn(&TaskError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for TaskCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCallbacks")
            .field("on_update", &self.on_update.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl TaskObserver for TaskCallbacks {
    fn on_update(&self, task: &Task) {
        if let Some(f) = &self.on_update {
            f(task);
        }
    }

    fn on_complete(&self, task: &Task) {
        if let Some(f) = &self.on_complete {
            f(task);
        }
    }

    fn on_error(&self, error: &TaskError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }
}
