//! Error taxonomy for lifecycle operations.
//!
//! Errors that reach the UI are serializable and carry only strings;
//! non-serializable sources such as `std::io::Error` are flattened on
//! conversion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ModelVersionRef, ModelVersionState};
use crate::notification::Operation;

/// Error returned by an [`MlBackendPort`](crate::ports::MlBackendPort) call.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    /// The request never produced a response (connection reset, timeout, ...).
    #[error("Network error: {message}")]
    Transport { message: String },

    /// The addressed resource does not exist (or no longer exists).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The backend answered with an error status.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl BackendError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Raw backend text, suitable for a "see full error" view.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Transport { message } | Self::Rejected { message, .. } => message.clone(),
            Self::NotFound { resource } => format!("{resource} was not found"),
        }
    }
}

/// Failure observed while following a task.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// The backend reported an error on the task itself.
    #[error("Task failed: {message}")]
    Failed { message: String },

    /// The status fetch could not be completed.
    #[error("Network error: {message}")]
    Transport { message: String },
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_task_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Failed { message } | Self::Transport { message } => message,
        }
    }
}

impl From<BackendError> for TaskError {
    fn from(err: BackendError) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

/// Setup-time violation of a lifecycle operation.
///
/// These are the only errors lifecycle operations return as `Err`: they are
/// detected before any state-changing backend call so callers can
/// short-circuit without committing UI state.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleError {
    /// The operation was invoked without a model version id.
    #[error("No model version id provided")]
    MissingId,

    /// The model version is not in a state that permits the operation.
    #[error("Cannot {operation} {model}: current state is {state}")]
    Precondition {
        operation: Operation,
        model: ModelVersionRef,
        state: ModelVersionState,
    },
}

impl LifecycleError {
    #[must_use]
    pub const fn precondition(
        operation: Operation,
        model: ModelVersionRef,
        state: ModelVersionState,
    ) -> Self {
        Self::Precondition {
            operation,
            model,
            state,
        }
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingId => "Select a model version first.".to_string(),
            Self::Precondition {
                operation,
                model,
                state,
            } => format!(
                "{model} cannot be {} while it is {state}.",
                operation.past_participle()
            ),
        }
    }
}

/// Setup-time failure of an upload (nothing was sent to the backend).
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadError {
    /// Registration metadata is incomplete.
    #[error("Invalid {field}: {reason}")]
    InvalidMetadata { field: String, reason: String },

    /// The artifact has no content.
    #[error("Model artifact is empty")]
    EmptyArtifact,

    /// The artifact could not be read.
    #[error("I/O error ({kind}): {message}")]
    Io { kind: String, message: String },
}

impl UploadError {
    pub fn invalid_metadata(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Capture the kind and message of a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidMetadata { field, reason } => format!("Model {field} {reason}."),
            Self::EmptyArtifact => "The selected model file is empty.".to_string(),
            Self::Io { message, .. } => format!("Could not read the model file: {message}"),
        }
    }
}
