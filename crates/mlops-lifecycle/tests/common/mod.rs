//! Shared helpers for mlops-lifecycle integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mlops_core::{
    BackendError, CreateModelVersionRequest, CreatedModelVersion, MlBackendPort, ModelVersion,
    ModelVersionId, Task, TaskHandle, TaskId,
};

mockall::mock! {
    pub Backend {}

    #[async_trait]
    impl MlBackendPort for Backend {
        async fn fetch_task(&self, task_id: &TaskId) -> Result<Task, BackendError>;
        async fn load_model_version(&self, id: &ModelVersionId) -> Result<TaskHandle, BackendError>;
        async fn unload_model_version(&self, id: &ModelVersionId) -> Result<(), BackendError>;
        async fn fetch_model_version(&self, id: &ModelVersionId) -> Result<ModelVersion, BackendError>;
        async fn create_model_version(
            &self,
            request: &CreateModelVersionRequest,
        ) -> Result<CreatedModelVersion, BackendError>;
        async fn upload_chunk(
            &self,
            id: &ModelVersionId,
            chunk_index: u64,
            bytes: Bytes,
        ) -> Result<(), BackendError>;
        async fn delete_model_version(&self, id: &ModelVersionId) -> Result<(), BackendError>;
    }
}

/// Route `mlops.*` logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mlops=debug")
        .with_test_writer()
        .try_init();
}
