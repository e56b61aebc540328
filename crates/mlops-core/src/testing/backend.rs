//! In-memory backend driven by per-test scripts.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{ModelVersion, ModelVersionId, ModelVersionState, Task, TaskHandle, TaskId};
use crate::errors::BackendError;
use crate::ports::{CreateModelVersionRequest, CreatedModelVersion, MlBackendPort};

/// A call received by [`ScriptedBackend`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    FetchTask(TaskId),
    Load(ModelVersionId),
    Unload(ModelVersionId),
    FetchModelVersion(ModelVersionId),
    Create(CreateModelVersionRequest),
    UploadChunk {
        id: ModelVersionId,
        index: u64,
        len: usize,
    },
    Delete(ModelVersionId),
}

#[derive(Default)]
struct State {
    model_versions: HashMap<ModelVersionId, ModelVersion>,
    /// Deleted versions and how many more reads still observe them.
    lingering: HashMap<ModelVersionId, (ModelVersion, u32)>,
    task_scripts: HashMap<TaskId, VecDeque<Result<Task, BackendError>>>,
    load_results: HashMap<ModelVersionId, Result<TaskHandle, BackendError>>,
    unload_errors: HashMap<ModelVersionId, BackendError>,
    delete_errors: HashMap<ModelVersionId, BackendError>,
    delete_lag: u32,
    fetch_latency: Duration,
    create_result: Option<Result<CreatedModelVersion, BackendError>>,
    chunk_failures: HashMap<u64, BackendError>,
    calls: Vec<BackendCall>,
}

/// Backend double whose answers are scripted up front.
///
/// Task scripts are consumed one response per `fetch_task`; the last
/// response repeats forever so a settled task stays settled.
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<State>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a model version snapshot.
    #[must_use]
    pub fn with_model_version(self, model_version: ModelVersion) -> Self {
        self.state()
            .model_versions
            .insert(model_version.id.clone(), model_version);
        self
    }

    /// Script the responses of `fetch_task` for one task.
    #[must_use]
    pub fn with_task_script(
        self,
        task_id: impl Into<TaskId>,
        responses: impl IntoIterator<Item = Result<Task, BackendError>>,
    ) -> Self {
        self.state()
            .task_scripts
            .insert(task_id.into(), responses.into_iter().collect());
        self
    }

    /// Answer `load_model_version` for `id` with a task handle.
    #[must_use]
    pub fn with_load_task(self, id: impl Into<ModelVersionId>, task_id: impl Into<TaskId>) -> Self {
        self.state()
            .load_results
            .insert(id.into(), Ok(TaskHandle::new(task_id)));
        self
    }

    /// Make `load_model_version` fail for `id`.
    #[must_use]
    pub fn with_load_error(self, id: impl Into<ModelVersionId>, error: BackendError) -> Self {
        self.state().load_results.insert(id.into(), Err(error));
        self
    }

    #[must_use]
    pub fn with_unload_error(self, id: impl Into<ModelVersionId>, error: BackendError) -> Self {
        self.state().unload_errors.insert(id.into(), error);
        self
    }

    #[must_use]
    pub fn with_delete_error(self, id: impl Into<ModelVersionId>, error: BackendError) -> Self {
        self.state().delete_errors.insert(id.into(), error);
        self
    }

    /// Number of reads that still see a version after it was deleted.
    #[must_use]
    pub fn with_delete_lag(self, reads: u32) -> Self {
        self.state().delete_lag = reads;
        self
    }

    /// Delay every `fetch_task` answer by `latency`, after the call is logged.
    #[must_use]
    pub fn with_fetch_latency(self, latency: Duration) -> Self {
        self.state().fetch_latency = latency;
        self
    }

    #[must_use]
    pub fn with_create_result(self, result: Result<CreatedModelVersion, BackendError>) -> Self {
        self.state().create_result = Some(result);
        self
    }

    /// Make the upload of chunk `index` fail.
    #[must_use]
    pub fn with_chunk_failure(self, index: u64, error: BackendError) -> Self {
        self.state().chunk_failures.insert(index, error);
        self
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    /// Number of `fetch_task` calls for `task_id`.
    #[must_use]
    pub fn fetch_task_count(&self, task_id: &TaskId) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::FetchTask(id) if id == task_id))
            .count()
    }

    #[must_use]
    pub fn load_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Load(_)))
            .count()
    }

    /// `(index, len)` of every uploaded chunk, in upload order.
    #[must_use]
    pub fn uploaded_chunks(&self) -> Vec<(u64, usize)> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::UploadChunk { index, len, .. } => Some((*index, *len)),
                _ => None,
            })
            .collect()
    }

    /// The last create request received.
    #[must_use]
    pub fn last_create_request(&self) -> Option<CreateModelVersionRequest> {
        self.state().calls.iter().rev().find_map(|c| match c {
            BackendCall::Create(request) => Some(request.clone()),
            _ => None,
        })
    }

    /// Current state of a stored model version.
    #[must_use]
    pub fn model_version_state(&self, id: &ModelVersionId) -> Option<ModelVersionState> {
        self.state().model_versions.get(id).map(|mv| mv.state)
    }
}

#[async_trait]
impl MlBackendPort for ScriptedBackend {
    async fn fetch_task(&self, task_id: &TaskId) -> Result<Task, BackendError> {
        let (response, latency) = {
            let mut state = self.state();
            state.calls.push(BackendCall::FetchTask(task_id.clone()));
            let latency = state.fetch_latency;
            let response = state.task_scripts.get_mut(task_id).and_then(|script| {
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().cloned()
                }
            });
            (response, latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        response.unwrap_or_else(|| Err(BackendError::not_found(format!("task {task_id}"))))
    }

    async fn load_model_version(&self, id: &ModelVersionId) -> Result<TaskHandle, BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Load(id.clone()));
        let result = state
            .load_results
            .get(id)
            .cloned()
            .unwrap_or_else(|| Err(BackendError::not_found(format!("model version {id}"))));
        if result.is_ok() {
            if let Some(mv) = state.model_versions.get_mut(id) {
                mv.state = ModelVersionState::Deploying;
            }
        }
        result
    }

    async fn unload_model_version(&self, id: &ModelVersionId) -> Result<(), BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Unload(id.clone()));
        if let Some(err) = state.unload_errors.get(id) {
            return Err(err.clone());
        }
        match state.model_versions.get_mut(id) {
            Some(mv) => {
                mv.state = ModelVersionState::Undeployed;
                Ok(())
            }
            None => Err(BackendError::not_found(format!("model version {id}"))),
        }
    }

    async fn fetch_model_version(
        &self,
        id: &ModelVersionId,
    ) -> Result<ModelVersion, BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::FetchModelVersion(id.clone()));
        if let Some(mv) = state.model_versions.get(id) {
            return Ok(mv.clone());
        }
        if let Some((mv, remaining)) = state.lingering.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(mv.clone());
            }
        }
        Err(BackendError::not_found(format!("model version {id}")))
    }

    async fn create_model_version(
        &self,
        request: &CreateModelVersionRequest,
    ) -> Result<CreatedModelVersion, BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Create(request.clone()));
        state.create_result.clone().unwrap_or_else(|| {
            Ok(CreatedModelVersion {
                model_version_id: Some(ModelVersionId::new("mv-new")),
                task_id: None,
            })
        })
    }

    async fn upload_chunk(
        &self,
        id: &ModelVersionId,
        chunk_index: u64,
        bytes: Bytes,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::UploadChunk {
            id: id.clone(),
            index: chunk_index,
            len: bytes.len(),
        });
        match state.chunk_failures.get(&chunk_index) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn delete_model_version(&self, id: &ModelVersionId) -> Result<(), BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Delete(id.clone()));
        if let Some(err) = state.delete_errors.get(id) {
            return Err(err.clone());
        }
        let lag = state.delete_lag;
        match state.model_versions.remove(id) {
            Some(mv) => {
                state.lingering.insert(id.clone(), (mv, lag));
                Ok(())
            }
            None => Err(BackendError::not_found(format!("model version {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskState;

    #[tokio::test(start_paused = true)]
    async fn fetch_latency_delays_the_answer_not_the_call_log() {
        let backend = ScriptedBackend::new()
            .with_task_script("t1", [Ok(Task::new("t1", TaskState::Completed))])
            .with_fetch_latency(Duration::from_secs(5));
        let id = TaskId::new("t1");
        let started = tokio::time::Instant::now();

        let fetch = backend.fetch_task(&id);
        tokio::pin!(fetch);
        tokio::select! {
            biased;
            _ = &mut fetch => panic!("answered before the latency elapsed"),
            () = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
        assert_eq!(backend.fetch_task_count(&id), 1);

        let task = fetch.await.unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn task_script_repeats_last_response() {
        let backend = ScriptedBackend::new().with_task_script(
            "t1",
            [
                Ok(Task::new("t1", TaskState::Running)),
                Ok(Task::new("t1", TaskState::Completed)),
            ],
        );
        let id = TaskId::new("t1");

        assert_eq!(backend.fetch_task(&id).await.unwrap().state, TaskState::Running);
        assert_eq!(backend.fetch_task(&id).await.unwrap().state, TaskState::Completed);
        assert_eq!(backend.fetch_task(&id).await.unwrap().state, TaskState::Completed);
        assert_eq!(backend.fetch_task_count(&id), 3);
    }

    #[tokio::test]
    async fn deleted_version_lingers_for_configured_reads() {
        let backend = ScriptedBackend::new()
            .with_model_version(ModelVersion::new(
                "mv-1",
                "bert",
                "1",
                ModelVersionState::Registered,
            ))
            .with_delete_lag(2);
        let id = ModelVersionId::new("mv-1");

        backend.delete_model_version(&id).await.unwrap();
        assert!(backend.fetch_model_version(&id).await.is_ok());
        assert!(backend.fetch_model_version(&id).await.is_ok());
        assert!(
            backend
                .fetch_model_version(&id)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn load_moves_version_to_deploying() {
        let backend = ScriptedBackend::new()
            .with_model_version(ModelVersion::new(
                "mv-1",
                "bert",
                "1",
                ModelVersionState::Registered,
            ))
            .with_load_task("mv-1", "t-load");
        let id = ModelVersionId::new("mv-1");

        let handle = backend.load_model_version(&id).await.unwrap();
        assert_eq!(handle.task_id.as_str(), "t-load");
        assert_eq!(
            backend.model_version_state(&id),
            Some(ModelVersionState::Deploying)
        );
        assert_eq!(backend.load_count(), 1);
    }
}
