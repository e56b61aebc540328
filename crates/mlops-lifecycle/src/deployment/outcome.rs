//! Resolved results of lifecycle operations.
//!
//! Backend and task failures are values, not errors: by the time they are
//! known the operation has started and the user has already been notified.

use mlops_core::{BackendError, Task};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The deploy task completed.
    Deployed { task: Task },
    /// The deploy task settled in a non-success state.
    TaskFailed { task: Task },
    /// A backend call failed before the task settled.
    BackendFailed { error: BackendError },
    /// The caller cancelled while the task was being followed.
    Cancelled,
}

impl DeployOutcome {
    #[must_use]
    pub const fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndeployOutcome {
    Undeployed,
    Failed { error: BackendError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The backend no longer reports the model version.
    Deleted,
    /// The delete request (or a confirmation read) failed.
    Failed { error: BackendError },
    /// The model version was still visible when the confirmation budget ran
    /// out.
    Unconfirmed { attempts: u32 },
    Cancelled,
}
