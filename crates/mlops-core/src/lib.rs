//! Core domain types and port definitions for mlops.
//!
//! This crate holds everything the asynchronous operation tracking engine
//! needs to talk about without committing to a transport: the task and
//! model-version domain, the backend and notifier ports, the error taxonomy,
//! user-facing notifications and runtime configuration.
//!
//! # Structure
//!
//! - `domain` - Tasks, model versions and their state machines
//! - `ports` - Trait abstractions for the ML backend, notifications and task observers
//! - `errors` - Backend, task, lifecycle and upload errors
//! - `notification` - User-visible success/failure notices with lazy detail actions
//! - `config` - Polling intervals, retry budgets and chunk sizing
//! - `testing` - Scripted collaborators (behind the `test-utils` feature)

#![deny(unused_crate_dependencies)]

pub mod config;
pub mod domain;
pub mod errors;
pub mod notification;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{
    ConfigError, DEFAULT_CHUNK_SIZE, DEFAULT_POLL_GAP, DEFAULT_POLL_MAX_RETRIES,
    DEFAULT_TASK_POLL_INTERVAL, OperationsConfig, PollingConfig,
};
pub use domain::{
    ModelFormat, ModelMetadata, ModelVersion, ModelVersionId, ModelVersionRef, ModelVersionState,
    Task, TaskHandle, TaskId, TaskState,
};
pub use errors::{BackendError, LifecycleError, TaskError, UploadError};
pub use notification::{DetailAction, Notification, NotificationKind, Operation};
pub use ports::{
    ArtifactContent, CreateModelVersionRequest, CreatedModelVersion, MlBackendPort,
    NoopNotifier, NoopObserver, NotifierPort, TaskCallbacks, TaskObserver,
};

#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio as _;
