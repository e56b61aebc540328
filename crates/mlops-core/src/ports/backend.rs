//! ML backend port definition.
//!
//! This port is the only way the engine talks to the model-serving backend.
//! Every operation the backend performs asynchronously surfaces here as a
//! task handle that callers poll through [`MlBackendPort::fetch_task`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::domain::{ModelMetadata, ModelVersion, ModelVersionId, Task, TaskHandle, TaskId};
use crate::errors::BackendError;

/// How the artifact of a new model version reaches the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ArtifactContent {
    /// Uploaded by the client in `total_chunks` sequential chunks.
    Chunked {
        /// SHA-256 of the whole artifact, lowercase hex.
        content_hash: String,
        total_chunks: u64,
        size_bytes: u64,
    },
    /// Fetched by the backend itself from a URL.
    Url { url: String },
}

/// Request to register a new model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateModelVersionRequest {
    #[serde(flatten)]
    pub metadata: ModelMetadata,
    pub content: ArtifactContent,
}

/// Backend response to a create request.
///
/// Chunked registrations allocate a model version id up front; URL
/// registrations return a task that settles with the new model id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedModelVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version_id: Option<ModelVersionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Port for the model-serving backend.
///
/// Implementations wrap a transport (REST client, test double). All methods
/// are single request/response calls; polling is the caller's concern.
#[async_trait]
pub trait MlBackendPort: Send + Sync {
    /// Fetch the current snapshot of a task.
    async fn fetch_task(&self, task_id: &TaskId) -> Result<Task, BackendError>;

    /// Start loading (deploying) a model version across the cluster.
    async fn load_model_version(&self, id: &ModelVersionId) -> Result<TaskHandle, BackendError>;

    /// Unload (undeploy) a model version. Completes synchronously.
    async fn unload_model_version(&self, id: &ModelVersionId) -> Result<(), BackendError>;

    /// Fetch a model version snapshot.
    ///
    /// Returns [`BackendError::NotFound`] once the version no longer exists.
    async fn fetch_model_version(&self, id: &ModelVersionId)
    -> Result<ModelVersion, BackendError>;

    /// Register a new model version.
    async fn create_model_version(
        &self,
        request: &CreateModelVersionRequest,
    ) -> Result<CreatedModelVersion, BackendError>;

    /// Upload one chunk of a chunked registration.
    async fn upload_chunk(
        &self,
        id: &ModelVersionId,
        chunk_index: u64,
        bytes: Bytes,
    ) -> Result<(), BackendError>;

    /// Delete a model version. Reads may still observe it for a while.
    async fn delete_model_version(&self, id: &ModelVersionId) -> Result<(), BackendError>;
}
