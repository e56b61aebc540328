//! Registration of new model versions.
//!
//! Local artifacts are fingerprinted, registered, then sent in strictly
//! sequential fixed-size chunks. URL artifacts are fetched by the backend
//! itself; the resulting task is followed through the shared
//! [`TaskObservationRegistry`].

mod chunks;
mod fingerprint;
mod source;

pub use chunks::ChunkPlan;
pub use source::ArtifactSource;

use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

use mlops_core::{
    ArtifactContent, BackendError, ConfigError, CreateModelVersionRequest, DetailAction, MlBackendPort,
    ModelMetadata, ModelVersionId, ModelVersionRef, Notification, NotifierPort, Operation,
    OperationsConfig, Task, TaskError, TaskId, TaskObserver, UploadError,
};
use mlops_tasks::{QueryOutcome, TaskObservationRegistry};
use tokio_util::sync::CancellationToken;

/// Progress after a chunk was accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadProgress {
    pub chunk_index: u64,
    pub total_chunks: u64,
    /// `(chunk_index + 1) / total_chunks`
    pub fraction: f64,
}

/// Step of an upload that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Create,
    Read { chunk_index: u64 },
    Chunk { chunk_index: u64 },
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("registration"),
            Self::Read { chunk_index } => write!(f, "reading chunk {chunk_index}"),
            Self::Chunk { chunk_index } => write!(f, "chunk {chunk_index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Every chunk was accepted.
    Uploaded { model_version_id: ModelVersionId },
    /// The backend is fetching the artifact; the task is being followed.
    Tracking {
        task_id: TaskId,
        query: QueryOutcome,
    },
    /// The upload was aborted. Nothing is retried or resumed.
    Failed { stage: UploadStage, message: String },
    Cancelled,
}

/// Uploads model artifacts and registers them as new model versions.
pub struct ChunkedUploadCoordinator {
    backend: Arc<dyn MlBackendPort>,
    notifier: Arc<dyn NotifierPort>,
    registry: Arc<TaskObservationRegistry>,
    chunk_size: NonZeroU64,
}

impl ChunkedUploadCoordinator {
    /// Fails with [`ConfigError::ZeroChunkSize`] when `config.chunk_size` is 0.
    pub fn new(
        backend: Arc<dyn MlBackendPort>,
        notifier: Arc<dyn NotifierPort>,
        registry: Arc<TaskObservationRegistry>,
        config: &OperationsConfig,
    ) -> Result<Self, ConfigError> {
        let chunk_size = NonZeroU64::new(config.chunk_size).ok_or(ConfigError::ZeroChunkSize)?;
        Ok(Self {
            backend,
            notifier,
            registry,
            chunk_size,
        })
    }

    /// Register `metadata` and upload `source` in sequential chunks.
    ///
    /// `progress` is called after every accepted chunk. Metadata and
    /// artifact problems are returned as `Err` before any backend call.
    pub async fn upload(
        &self,
        source: ArtifactSource,
        metadata: ModelMetadata,
        progress: &(dyn Fn(UploadProgress) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        metadata.validate()?;
        let mut artifact = source.open().await?;
        let content_hash = source.fingerprint().await?;
        let plan = ChunkPlan::new(artifact.size(), self.chunk_size.get());
        let subject = ModelVersionRef::from_metadata(&metadata);

        tracing::info!(
            target: "mlops.upload",
            name = %metadata.name,
            version = %metadata.version,
            size_bytes = plan.size(),
            total_chunks = plan.total_chunks(),
            "Starting upload"
        );

        let request = CreateModelVersionRequest {
            metadata,
            content: ArtifactContent::Chunked {
                content_hash,
                total_chunks: plan.total_chunks(),
                size_bytes: plan.size(),
            },
        };
        let model_version_id = match self.backend.create_model_version(&request).await {
            Ok(created) => match created.model_version_id {
                Some(id) => id,
                None => {
                    return Ok(self.abort(
                        subject,
                        UploadStage::Create,
                        "the backend did not return a model version id".to_string(),
                    ));
                }
            },
            Err(error) => return Ok(self.abort_with(subject, UploadStage::Create, &error)),
        };
        let subject = subject.with_id(model_version_id.clone());

        for chunk_index in 0..plan.total_chunks() {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(&model_version_id, chunk_index));
            }

            let range = plan.range(chunk_index);
            let bytes = match artifact.read(range).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    return Ok(self.abort(
                        subject,
                        UploadStage::Read { chunk_index },
                        UploadError::from_io_error(&err).user_message(),
                    ));
                }
            };

            let sent = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    return Ok(self.cancelled(&model_version_id, chunk_index));
                }

                sent = self.backend.upload_chunk(&model_version_id, chunk_index, bytes) => sent,
            };

            if let Err(error) = sent {
                return Ok(self.abort_with(subject, UploadStage::Chunk { chunk_index }, &error));
            }

            tracing::debug!(
                target: "mlops.upload",
                model_version_id = %model_version_id,
                chunk_index,
                total_chunks = plan.total_chunks(),
                "Chunk uploaded"
            );
            progress(UploadProgress {
                chunk_index,
                total_chunks: plan.total_chunks(),
                fraction: plan.progress_after(chunk_index),
            });
        }

        tracing::info!(
            target: "mlops.upload",
            model_version_id = %model_version_id,
            "Upload finished"
        );
        self.notifier
            .notify(Notification::success(Operation::Upload, subject));
        Ok(UploadOutcome::Uploaded { model_version_id })
    }

    /// Register `metadata` with an artifact the backend downloads itself.
    ///
    /// The returned task is followed through the registry; `observer`
    /// receives its callbacks after the upload notification is sent.
    pub async fn upload_from_url(
        &self,
        url: &str,
        metadata: ModelMetadata,
        observer: Arc<dyn TaskObserver>,
    ) -> Result<UploadOutcome, UploadError> {
        metadata.validate()?;
        let url = url.trim();
        if url.is_empty() {
            return Err(UploadError::invalid_metadata("url", "must not be empty"));
        }
        let subject = ModelVersionRef::from_metadata(&metadata);

        let request = CreateModelVersionRequest {
            metadata,
            content: ArtifactContent::Url {
                url: url.to_string(),
            },
        };
        let created = match self.backend.create_model_version(&request).await {
            Ok(created) => created,
            Err(error) => return Ok(self.abort_with(subject, UploadStage::Create, &error)),
        };
        let subject = match created.model_version_id {
            Some(id) => subject.with_id(id),
            None => subject,
        };

        let Some(task_id) = created.task_id else {
            return Ok(self.abort(
                subject,
                UploadStage::Create,
                "the backend did not return a task id".to_string(),
            ));
        };

        tracing::info!(
            target: "mlops.upload",
            task_id = %task_id,
            url,
            "Following URL upload"
        );
        let notifying = Arc::new(UploadTaskObserver {
            notifier: Arc::clone(&self.notifier),
            subject,
            task_id: task_id.clone(),
            inner: observer,
        });
        let query = self.registry.query(task_id.clone(), notifying);

        Ok(UploadOutcome::Tracking { task_id, query })
    }

    fn abort_with(
        &self,
        subject: ModelVersionRef,
        stage: UploadStage,
        error: &BackendError,
    ) -> UploadOutcome {
        if error.is_transport() {
            tracing::warn!(target: "mlops.upload", stage = %stage, error = %error, "Upload failed");
            self.notifier
                .notify(Notification::network_error(Operation::Upload, subject));
            return UploadOutcome::Failed {
                stage,
                message: error.to_string(),
            };
        }
        self.abort(subject, stage, error.detail())
    }

    fn abort(&self, subject: ModelVersionRef, stage: UploadStage, message: String) -> UploadOutcome {
        tracing::warn!(target: "mlops.upload", stage = %stage, error = %message, "Upload failed");
        self.notifier.notify(Notification::failure(
            Operation::Upload,
            subject,
            format!("{stage} failed"),
            Some(DetailAction::Raw {
                message: message.clone(),
            }),
        ));
        UploadOutcome::Failed { stage, message }
    }

    fn cancelled(&self, model_version_id: &ModelVersionId, chunk_index: u64) -> UploadOutcome {
        tracing::info!(
            target: "mlops.upload",
            model_version_id = %model_version_id,
            chunk_index,
            "Upload cancelled"
        );
        UploadOutcome::Cancelled
    }
}

/// Notifies about a URL upload when its task settles, then forwards.
struct UploadTaskObserver {
    notifier: Arc<dyn NotifierPort>,
    subject: ModelVersionRef,
    task_id: TaskId,
    inner: Arc<dyn TaskObserver>,
}

impl TaskObserver for UploadTaskObserver {
    fn on_update(&self, task: &Task) {
        self.inner.on_update(task);
    }

    fn on_complete(&self, task: &Task) {
        let subject = match &task.result_model_id {
            Some(id) => self.subject.clone().with_id(ModelVersionId::new(id.as_str())),
            None => self.subject.clone(),
        };
        self.notifier
            .notify(Notification::success(Operation::Upload, subject));
        self.inner.on_complete(task);
    }

    fn on_error(&self, error: &TaskError) {
        let notification = match error {
            TaskError::Failed { .. } => Notification::failure(
                Operation::Upload,
                self.subject.clone(),
                "the backend could not fetch the artifact",
                Some(DetailAction::TaskError {
                    task_id: self.task_id.clone(),
                }),
            ),
            TaskError::Transport { .. } => {
                Notification::network_error(Operation::Upload, self.subject.clone())
            }
        };
        self.notifier.notify(notification);
        self.inner.on_error(error);
    }
}
