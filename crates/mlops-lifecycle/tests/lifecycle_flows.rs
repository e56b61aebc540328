//! Lifecycle flows through the public API.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use mlops_core::testing::{RecordingNotifier, ScriptedBackend};
use mlops_core::{
    ArtifactContent, BackendError, LifecycleError, MlBackendPort, ModelMetadata, ModelVersion,
    ModelVersionId, ModelVersionState, NoopObserver, NotifierPort, OperationsConfig, Operation,
    Task, TaskState,
};
use mlops_lifecycle::{
    ArtifactSource, DeleteOutcome, DeployOutcome, LifecycleDeps, UndeployOutcome,
    UploadOutcome, build_lifecycle,
};
use mockall::predicate::eq;
use tokio_util::sync::CancellationToken;

mod common;

use common::{MockBackend, init_tracing};

#[tokio::test]
async fn deploy_of_deployed_version_never_loads() -> Result<()> {
    init_tracing();
    let mut backend = MockBackend::new();
    backend
        .expect_fetch_model_version()
        .with(eq(ModelVersionId::new("mv-1")))
        .times(1)
        .returning(|id| {
            Ok(ModelVersion::new(
                id.clone(),
                "bert",
                "4",
                ModelVersionState::Deployed,
            ))
        });
    backend.expect_load_model_version().never();
    let notifier = Arc::new(RecordingNotifier::new());

    let services = build_lifecycle(LifecycleDeps {
        backend: Arc::new(backend),
        notifier: Arc::clone(&notifier) as Arc<dyn NotifierPort>,
        config: OperationsConfig::default(),
    })?;

    let err = services
        .deployments
        .deploy(
            &ModelVersionId::new("mv-1"),
            &NoopObserver,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Cannot deploy bert version 4: current state is DEPLOYED"
    );
    assert!(matches!(
        err,
        LifecycleError::Precondition {
            operation: Operation::Deploy,
            ..
        }
    ));
    assert!(notifier.last().is_some_and(|n| n.is_failure()));
    Ok(())
}

#[tokio::test]
async fn undeploy_transport_failure_is_a_value() -> Result<()> {
    init_tracing();
    let mut backend = MockBackend::new();
    backend.expect_fetch_model_version().returning(|id| {
        Ok(ModelVersion::new(
            id.clone(),
            "bert",
            "4",
            ModelVersionState::Deployed,
        ))
    });
    backend
        .expect_unload_model_version()
        .times(1)
        .returning(|_| Err(BackendError::transport("timed out")));

    let services = build_lifecycle(LifecycleDeps {
        backend: Arc::new(backend),
        notifier: Arc::new(RecordingNotifier::new()),
        config: OperationsConfig::default(),
    })?;

    let outcome = services
        .deployments
        .undeploy(&ModelVersionId::new("mv-1"))
        .await?;

    assert_eq!(
        outcome,
        UndeployOutcome::Failed {
            error: BackendError::transport("timed out")
        }
    );
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let result = build_lifecycle(LifecycleDeps {
        backend: Arc::new(ScriptedBackend::new()),
        notifier: Arc::new(RecordingNotifier::new()),
        config: OperationsConfig::default().with_chunk_size(0),
    });
    assert!(result.is_err());
}

#[tokio::test]
async fn file_upload_streams_chunks_in_order() -> Result<()> {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new()?;
    let payload: Vec<u8> = (0..25u8).collect();
    file.write_all(&payload)?;

    let backend = Arc::new(ScriptedBackend::new());
    let services = build_lifecycle(LifecycleDeps {
        backend: Arc::clone(&backend) as Arc<dyn MlBackendPort>,
        notifier: Arc::new(RecordingNotifier::new()),
        config: OperationsConfig::default().with_chunk_size(10),
    })?;

    let progress = Mutex::new(Vec::new());
    let outcome = services
        .uploads
        .upload(
            ArtifactSource::File(file.path().to_path_buf()),
            ModelMetadata::new("tiny", "1"),
            &|p| progress.lock().unwrap().push(p.chunk_index),
            &CancellationToken::new(),
        )
        .await?;

    assert!(matches!(outcome, UploadOutcome::Uploaded { .. }));
    assert_eq!(backend.uploaded_chunks(), vec![(0, 10), (1, 10), (2, 5)]);
    assert_eq!(*progress.lock().unwrap(), vec![0, 1, 2]);
    assert!(matches!(
        backend.last_create_request().map(|r| r.content),
        Some(ArtifactContent::Chunked {
            total_chunks: 3,
            size_bytes: 25,
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn missing_file_fails_before_any_call() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = Arc::new(ScriptedBackend::new());
    let services = build_lifecycle(LifecycleDeps {
        backend: Arc::clone(&backend) as Arc<dyn MlBackendPort>,
        notifier: Arc::new(RecordingNotifier::new()),
        config: OperationsConfig::default(),
    })?;

    let result = services
        .uploads
        .upload(
            ArtifactSource::File(dir.path().join("missing.onnx")),
            ModelMetadata::new("tiny", "1"),
            &|_| {},
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
    assert!(backend.calls().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deploy_then_delete_round_trip() -> Result<()> {
    init_tracing();
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_model_version(ModelVersion::new(
                "mv-1",
                "bert",
                "4",
                ModelVersionState::Undeployed,
            ))
            .with_load_task("mv-1", "deploy-1")
            .with_task_script(
                "deploy-1",
                [
                    Ok(Task::new("deploy-1", TaskState::Running)),
                    Ok(Task::new("deploy-1", TaskState::Completed)),
                ],
            )
            .with_delete_lag(2),
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let services = build_lifecycle(LifecycleDeps {
        backend: Arc::clone(&backend) as Arc<dyn MlBackendPort>,
        notifier: Arc::clone(&notifier) as Arc<dyn NotifierPort>,
        config: OperationsConfig::default()
            .with_deploy_poll_interval(Duration::from_millis(500)),
    })?;
    let id = ModelVersionId::new("mv-1");
    let cancel = CancellationToken::new();

    let deployed = services.deployments.deploy(&id, &NoopObserver, &cancel).await?;
    assert!(matches!(deployed, DeployOutcome::Deployed { .. }));

    // The scripted backend leaves the version in DEPLOYING after a load.
    let refused = services.deployments.delete(&id, &cancel).await;
    assert!(matches!(refused, Err(LifecycleError::Precondition { .. })));

    let undeployed = services.deployments.undeploy(&id).await;
    assert!(undeployed.is_err());

    let titles: Vec<String> = notifier.notifications().into_iter().map(|n| n.title).collect();
    assert_eq!(titles[0], "bert version 4 was deployed");
    assert_eq!(titles.len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn delete_confirms_after_lagging_reads() -> Result<()> {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_model_version(ModelVersion::new(
                "mv-2",
                "gpt",
                "1",
                ModelVersionState::DeployFailed,
            ))
            .with_delete_lag(5),
    );
    let services = build_lifecycle(LifecycleDeps {
        backend: Arc::clone(&backend) as Arc<dyn MlBackendPort>,
        notifier: Arc::new(RecordingNotifier::new()),
        config: OperationsConfig::default(),
    })?;

    let started = tokio::time::Instant::now();
    let outcome = services
        .deployments
        .delete(&ModelVersionId::new("mv-2"), &CancellationToken::new())
        .await?;

    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(started.elapsed() >= Duration::from_millis(6 * 300));
    services.shutdown();
    Ok(())
}
