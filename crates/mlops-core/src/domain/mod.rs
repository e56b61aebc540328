//! Core domain types.
//!
//! - `task` - Backend task snapshots and handles
//! - `model_version` - Model versions, their lifecycle state machine and registration metadata

mod model_version;
mod task;

pub use model_version::{
    ModelFormat, ModelMetadata, ModelVersion, ModelVersionId, ModelVersionRef, ModelVersionState,
};
pub use task::{Task, TaskHandle, TaskId, TaskState};
