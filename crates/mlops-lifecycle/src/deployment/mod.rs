//! Deploy, undeploy and delete flows for a single model version.
//!
//! Each flow checks the model version's current state before any
//! state-changing call, so a precondition violation costs one read and
//! surfaces as `Err(LifecycleError)`. Everything after that point resolves
//! to an outcome value and a notification.

mod outcome;

pub use outcome::{DeleteOutcome, DeployOutcome, UndeployOutcome};

use std::sync::{Arc, Mutex, PoisonError};

use mlops_core::{
    BackendError, DetailAction, LifecycleError, MlBackendPort, ModelVersion, ModelVersionId,
    ModelVersionRef, ModelVersionState, Notification, NotifierPort, OperationsConfig, Operation,
    PollingConfig, Task, TaskError, TaskObserver, TaskState,
};
use mlops_tasks::{PollOutcome, PollingScheduler};
use tokio_util::sync::CancellationToken;

/// Drives lifecycle transitions of model versions against the backend.
pub struct DeploymentCoordinator {
    backend: Arc<dyn MlBackendPort>,
    notifier: Arc<dyn NotifierPort>,
    config: OperationsConfig,
}

impl DeploymentCoordinator {
    pub fn new(
        backend: Arc<dyn MlBackendPort>,
        notifier: Arc<dyn NotifierPort>,
        config: OperationsConfig,
    ) -> Self {
        Self {
            backend,
            notifier,
            config,
        }
    }

    /// Deploy a model version and follow the deploy task to settlement.
    ///
    /// The task is polled every `deploy_poll_interval` while it is `CREATED`
    /// or `RUNNING`. `observer` receives every snapshot, then `on_complete`
    /// or `on_error`. Cancelling `cancel` stops following the task without
    /// notifying; the backend keeps deploying.
    pub async fn deploy(
        &self,
        id: &ModelVersionId,
        observer: &dyn TaskObserver,
        cancel: &CancellationToken,
    ) -> Result<DeployOutcome, LifecycleError> {
        let snapshot = match self.snapshot(Operation::Deploy, id).await? {
            Ok(snapshot) => snapshot,
            Err(error) => {
                observer.on_error(&TaskError::from(error.clone()));
                return Ok(DeployOutcome::BackendFailed { error });
            }
        };
        self.require(Operation::Deploy, &snapshot, ModelVersionState::can_deploy)?;
        let subject = snapshot.reference();

        let handle = match self.backend.load_model_version(id).await {
            Ok(handle) => handle,
            Err(error) => {
                self.report_backend_failure(Operation::Deploy, subject, &error);
                observer.on_error(&TaskError::from(error.clone()));
                return Ok(DeployOutcome::BackendFailed { error });
            }
        };

        tracing::info!(
            target: "mlops.lifecycle",
            model_version_id = %id,
            task_id = %handle.task_id,
            "Deploy started"
        );

        let latest: Mutex<Option<Task>> = Mutex::new(None);
        let result = {
            let backend = self.backend.as_ref();
            let task_id = &handle.task_id;
            let latest = &latest;
            let checker = move || async move {
                let task = backend.fetch_task(task_id).await?;
                observer.on_update(&task);
                let pending = task.state.is_pending();
                *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
                Ok::<_, BackendError>(pending)
            };

            PollingScheduler::new(
                PollingConfig::unbounded(self.config.deploy_poll_interval),
                checker,
            )
            .with_cancellation(cancel.clone())
            .start()
            .await
        };
        let last = latest.into_inner().unwrap_or_else(PoisonError::into_inner);

        let outcome = match (result, last) {
            (Err(error), _) => {
                tracing::warn!(
                    target: "mlops.lifecycle",
                    task_id = %handle.task_id,
                    error = %error,
                    "Lost track of deploy task"
                );
                self.report_backend_failure(Operation::Deploy, subject, &error);
                observer.on_error(&TaskError::from(error.clone()));
                DeployOutcome::BackendFailed { error }
            }
            (Ok(PollOutcome::Cancelled), _) | (Ok(_), None) => DeployOutcome::Cancelled,
            (Ok(_), Some(task)) if task.state == TaskState::Completed => {
                tracing::info!(target: "mlops.lifecycle", model_version_id = %id, "Deploy completed");
                self.notifier
                    .notify(Notification::success(Operation::Deploy, subject));
                observer.on_complete(&task);
                DeployOutcome::Deployed { task }
            }
            (Ok(_), Some(task)) => {
                tracing::info!(
                    target: "mlops.lifecycle",
                    model_version_id = %id,
                    state = %task.state,
                    "Deploy task did not complete"
                );
                self.notifier.notify(Notification::failure(
                    Operation::Deploy,
                    subject,
                    format!("task {}", task.state),
                    Some(DetailAction::TaskError {
                        task_id: task.id.clone(),
                    }),
                ));
                let message = task
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("Task ended in state {}", task.state));
                observer.on_error(&TaskError::failed(message));
                DeployOutcome::TaskFailed { task }
            }
        };

        Ok(outcome)
    }

    /// Undeploy a deployed (or partially deployed) model version.
    pub async fn undeploy(&self, id: &ModelVersionId) -> Result<UndeployOutcome, LifecycleError> {
        let snapshot = match self.snapshot(Operation::Undeploy, id).await? {
            Ok(snapshot) => snapshot,
            Err(error) => return Ok(UndeployOutcome::Failed { error }),
        };
        self.require(Operation::Undeploy, &snapshot, ModelVersionState::can_undeploy)?;
        let subject = snapshot.reference();

        match self.backend.unload_model_version(id).await {
            Ok(()) => {
                tracing::info!(target: "mlops.lifecycle", model_version_id = %id, "Undeployed");
                self.notifier
                    .notify(Notification::success(Operation::Undeploy, subject));
                Ok(UndeployOutcome::Undeployed)
            }
            Err(error) => {
                tracing::warn!(
                    target: "mlops.lifecycle",
                    model_version_id = %id,
                    error = %error,
                    "Undeploy failed"
                );
                self.notifier.notify(Notification::failure(
                    Operation::Undeploy,
                    subject,
                    "request failed",
                    Some(DetailAction::Raw {
                        message: error.detail(),
                    }),
                ));
                Ok(UndeployOutcome::Failed { error })
            }
        }
    }

    /// Delete a model version and wait until the backend stops reporting it.
    ///
    /// Confirmation polls use `delete_confirmation`; the version is gone once
    /// a read answers `NotFound`.
    pub async fn delete(
        &self,
        id: &ModelVersionId,
        cancel: &CancellationToken,
    ) -> Result<DeleteOutcome, LifecycleError> {
        let snapshot = match self.snapshot(Operation::Delete, id).await? {
            Ok(snapshot) => snapshot,
            Err(error) => return Ok(DeleteOutcome::Failed { error }),
        };
        self.require(Operation::Delete, &snapshot, ModelVersionState::can_delete)?;
        let subject = snapshot.reference();

        if let Err(error) = self.backend.delete_model_version(id).await {
            tracing::warn!(
                target: "mlops.lifecycle",
                model_version_id = %id,
                error = %error,
                "Delete request failed"
            );
            self.notifier.notify(Notification::failure(
                Operation::Delete,
                subject,
                "request failed",
                Some(DetailAction::Raw {
                    message: error.detail(),
                }),
            ));
            return Ok(DeleteOutcome::Failed { error });
        }

        let backend = self.backend.as_ref();
        let checker = move || async move {
            match backend.fetch_model_version(id).await {
                Ok(_) => Ok(true),
                Err(err) if err.is_not_found() => Ok(false),
                Err(err) => Err(err),
            }
        };

        let confirmed = {
            let notifier = Arc::clone(&self.notifier);
            let subject = subject.clone();
            move || notifier.notify(Notification::success(Operation::Delete, subject))
        };
        let exhausted = {
            let notifier = Arc::clone(&self.notifier);
            let subject = subject.clone();
            move || {
                notifier.notify(Notification::failure(
                    Operation::Delete,
                    subject,
                    "the model version is still present",
                    None,
                ));
            }
        };

        let mut scheduler = PollingScheduler::new(self.config.delete_confirmation, checker)
            .on_give_up(confirmed)
            .on_max_retries(exhausted)
            .with_cancellation(cancel.clone());

        let outcome = match scheduler.start().await {
            Ok(PollOutcome::GaveUp) => {
                tracing::info!(target: "mlops.lifecycle", model_version_id = %id, "Deleted");
                DeleteOutcome::Deleted
            }
            Ok(PollOutcome::MaxRetries) => {
                tracing::warn!(
                    target: "mlops.lifecycle",
                    model_version_id = %id,
                    attempts = scheduler.attempts_made(),
                    "Delete not confirmed"
                );
                DeleteOutcome::Unconfirmed {
                    attempts: scheduler.attempts_made(),
                }
            }
            Ok(PollOutcome::Cancelled) => DeleteOutcome::Cancelled,
            Err(error) => {
                self.report_backend_failure(Operation::Delete, subject, &error);
                DeleteOutcome::Failed { error }
            }
        };

        Ok(outcome)
    }

    /// Resolve the "see full error" action of a failure notification.
    ///
    /// Task details are fetched only now, not when the failure was reported.
    pub async fn error_detail(&self, action: &DetailAction) -> Result<String, BackendError> {
        match action {
            DetailAction::Raw { message } => Ok(message.clone()),
            DetailAction::TaskError { task_id } => {
                let task = self.backend.fetch_task(task_id).await?;
                Ok(task.error.unwrap_or_else(|| {
                    format!("Task {task_id} is {} and reported no error", task.state)
                }))
            }
        }
    }

    /// Read the current snapshot.
    ///
    /// A read failure is reported to the user and returned in the inner
    /// `Err`; only a missing id is a setup error.
    async fn snapshot(
        &self,
        operation: Operation,
        id: &ModelVersionId,
    ) -> Result<Result<ModelVersion, BackendError>, LifecycleError> {
        if id.is_empty() {
            return Err(LifecycleError::MissingId);
        }

        let result = self.backend.fetch_model_version(id).await;
        if let Err(error) = &result {
            tracing::warn!(
                target: "mlops.lifecycle",
                model_version_id = %id,
                operation = %operation,
                error = %error,
                "Could not read model version"
            );
            self.report_backend_failure(operation, ModelVersionRef::from_id(id.clone()), error);
        }
        Ok(result)
    }

    fn require(
        &self,
        operation: Operation,
        snapshot: &ModelVersion,
        allowed: fn(ModelVersionState) -> bool,
    ) -> Result<(), LifecycleError> {
        if allowed(snapshot.state) {
            return Ok(());
        }

        tracing::debug!(
            target: "mlops.lifecycle",
            model_version_id = %snapshot.id,
            operation = %operation,
            state = %snapshot.state,
            "Precondition failed"
        );
        self.notifier.notify(Notification::failure(
            operation,
            snapshot.reference(),
            format!("current state is {}", snapshot.state),
            None,
        ));
        Err(LifecycleError::precondition(
            operation,
            snapshot.reference(),
            snapshot.state,
        ))
    }

    fn report_backend_failure(
        &self,
        operation: Operation,
        subject: ModelVersionRef,
        error: &BackendError,
    ) {
        let notification = if error.is_transport() {
            Notification::network_error(operation, subject)
        } else {
            Notification::failure(
                operation,
                subject,
                "request failed",
                Some(DetailAction::Raw {
                    message: error.detail(),
                }),
            )
        };
        self.notifier.notify(notification);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mlops_core::testing::{ObservedEvent, RecordingNotifier, RecordingObserver, ScriptedBackend};
    use mlops_core::{NoopObserver, NotificationKind};

    use super::*;

    fn coordinator(
        backend: &Arc<ScriptedBackend>,
        notifier: &Arc<RecordingNotifier>,
    ) -> DeploymentCoordinator {
        DeploymentCoordinator::new(
            Arc::clone(backend) as Arc<dyn MlBackendPort>,
            Arc::clone(notifier) as Arc<dyn NotifierPort>,
            OperationsConfig::default(),
        )
    }

    fn version(id: &str, state: ModelVersionState) -> ModelVersion {
        ModelVersion::new(id, "bert", "3", state)
    }

    fn deploy_backend(script: Vec<Result<Task, BackendError>>) -> Arc<ScriptedBackend> {
        Arc::new(
            ScriptedBackend::new()
                .with_model_version(version("mv-1", ModelVersionState::Registered))
                .with_load_task("mv-1", "deploy-1")
                .with_task_script("deploy-1", script),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_completes_and_notifies() {
        let backend = deploy_backend(vec![
            Ok(Task::new("deploy-1", TaskState::Created)),
            Ok(Task::new("deploy-1", TaskState::Running)),
            Ok(Task::new("deploy-1", TaskState::Completed)),
        ]);
        let notifier = Arc::new(RecordingNotifier::new());
        let observer = RecordingObserver::new();

        let started = tokio::time::Instant::now();
        let outcome = coordinator(&backend, &notifier)
            .deploy(&ModelVersionId::new("mv-1"), &observer, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_deployed());
        assert!(started.elapsed() >= Duration::from_millis(6000));
        assert_eq!(observer.updates(), 3);
        assert_eq!(observer.completions(), 1);
        assert_eq!(backend.fetch_task_count(&"deploy-1".into()), 3);

        let note = notifier.last().unwrap();
        assert_eq!(note.kind, NotificationKind::Success);
        assert_eq!(note.title, "bert version 3 was deployed");
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_task_failure_carries_lazy_detail() {
        let backend = deploy_backend(vec![
            Ok(Task::new("deploy-1", TaskState::Running)),
            Ok(Task::new("deploy-1", TaskState::Failed).with_error("CUDA out of memory")),
        ]);
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(&backend, &notifier);
        let observer = RecordingObserver::new();

        let outcome = coordinator
            .deploy(&ModelVersionId::new("mv-1"), &observer, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, DeployOutcome::TaskFailed { ref task } if task.state == TaskState::Failed));
        assert_eq!(
            observer.events().last(),
            Some(&ObservedEvent::Error(TaskError::failed("CUDA out of memory")))
        );

        let note = notifier.last().unwrap();
        assert!(note.is_failure());
        let fetches_before = backend.fetch_task_count(&"deploy-1".into());
        let detail = note.detail.expect("task failures carry a detail action");
        assert_eq!(
            detail,
            DetailAction::TaskError {
                task_id: "deploy-1".into()
            }
        );
        assert_eq!(
            coordinator.error_detail(&detail).await.unwrap(),
            "CUDA out of memory"
        );
        assert_eq!(
            backend.fetch_task_count(&"deploy-1".into()),
            fetches_before + 1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_cancelled_and_completed_with_error_are_failures() {
        for state in [TaskState::Cancelled, TaskState::CompletedWithError] {
            let backend = deploy_backend(vec![Ok(Task::new("deploy-1", state))]);
            let notifier = Arc::new(RecordingNotifier::new());

            let outcome = coordinator(&backend, &notifier)
                .deploy(&ModelVersionId::new("mv-1"), &NoopObserver, &CancellationToken::new())
                .await
                .unwrap();

            assert!(matches!(outcome, DeployOutcome::TaskFailed { .. }), "{state}");
            assert!(notifier.last().unwrap().detail.is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_network_error_while_polling() {
        let backend = deploy_backend(vec![
            Ok(Task::new("deploy-1", TaskState::Running)),
            Err(BackendError::transport("connection refused")),
        ]);
        let notifier = Arc::new(RecordingNotifier::new());
        let observer = RecordingObserver::new();

        let outcome = coordinator(&backend, &notifier)
            .deploy(&ModelVersionId::new("mv-1"), &observer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeployOutcome::BackendFailed {
                error: BackendError::transport("connection refused")
            }
        );
        let note = notifier.last().unwrap();
        assert_eq!(note.title, "Failed to deploy bert version 3: network error");
        assert!(note.detail.is_none());
        assert_eq!(observer.errors(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_rejects_wrong_state_without_loading() {
        let backend = Arc::new(
            ScriptedBackend::new().with_model_version(version("mv-1", ModelVersionState::Deploying)),
        );
        let notifier = Arc::new(RecordingNotifier::new());

        let err = coordinator(&backend, &notifier)
            .deploy(&ModelVersionId::new("mv-1"), &NoopObserver, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::Precondition {
                operation: Operation::Deploy,
                state: ModelVersionState::Deploying,
                ..
            }
        ));
        assert_eq!(backend.load_count(), 0);
        assert!(notifier.last().unwrap().is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_id_is_rejected_before_any_call() {
        let backend = Arc::new(ScriptedBackend::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(&backend, &notifier);

        let err = coordinator.undeploy(&ModelVersionId::new("")).await.unwrap_err();

        assert_eq!(err, LifecycleError::MissingId);
        assert!(backend.calls().is_empty());
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_following_the_deploy() {
        let backend = deploy_backend(vec![Ok(Task::new("deploy-1", TaskState::Running))]);
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(&backend, &notifier);
        let cancel = CancellationToken::new();
        let id = ModelVersionId::new("mv-1");

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5000)).await;
                cancel.cancel();
            }
        };
        let (outcome, ()) = tokio::join!(
            coordinator.deploy(&id, &NoopObserver, &cancel),
            canceller
        );

        assert_eq!(outcome.unwrap(), DeployOutcome::Cancelled);
        assert_eq!(backend.fetch_task_count(&"deploy-1".into()), 2);
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_slow_status_fetch_is_silent() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_model_version(version("mv-1", ModelVersionState::Registered))
                .with_load_task("mv-1", "deploy-1")
                .with_task_script("deploy-1", [Ok(Task::new("deploy-1", TaskState::Completed))])
                .with_fetch_latency(Duration::from_millis(1500)),
        );
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(&backend, &notifier);
        let observer = RecordingObserver::new();
        let cancel = CancellationToken::new();
        let id = ModelVersionId::new("mv-1");

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                cancel.cancel();
            }
        };
        let (outcome, ()) = tokio::join!(coordinator.deploy(&id, &observer, &cancel), canceller);

        assert_eq!(outcome.unwrap(), DeployOutcome::Cancelled);
        assert_eq!(backend.fetch_task_count(&"deploy-1".into()), 1);
        assert!(observer.events().is_empty());
        assert_eq!(notifier.count(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(observer.events().is_empty());
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test]
    async fn undeploy_success_and_failure() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_model_version(version("ok", ModelVersionState::Deployed))
                .with_model_version(version("bad", ModelVersionState::PartiallyDeployed))
                .with_unload_error("bad", BackendError::rejected(500, "node unreachable")),
        );
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(&backend, &notifier);

        let outcome = coordinator.undeploy(&ModelVersionId::new("ok")).await.unwrap();
        assert_eq!(outcome, UndeployOutcome::Undeployed);
        assert_eq!(
            backend.model_version_state(&ModelVersionId::new("ok")),
            Some(ModelVersionState::Undeployed)
        );
        assert_eq!(notifier.last().unwrap().title, "bert version 3 was undeployed");

        let outcome = coordinator.undeploy(&ModelVersionId::new("bad")).await.unwrap();
        assert!(matches!(outcome, UndeployOutcome::Failed { .. }));
        let note = notifier.last().unwrap();
        assert!(note.is_failure());
        assert_eq!(
            note.detail,
            Some(DetailAction::Raw {
                message: "node unreachable".into()
            })
        );
    }

    #[tokio::test]
    async fn undeploy_requires_deployed_state() {
        let backend = Arc::new(
            ScriptedBackend::new().with_model_version(version("mv-1", ModelVersionState::Registered)),
        );
        let notifier = Arc::new(RecordingNotifier::new());

        let err = coordinator(&backend, &notifier)
            .undeploy(&ModelVersionId::new("mv-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Precondition { .. }));
        assert!(!backend
            .calls()
            .iter()
            .any(|c| matches!(c, mlops_core::testing::BackendCall::Unload(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_version_disappears() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_model_version(version("mv-1", ModelVersionState::Undeployed))
                .with_delete_lag(3),
        );
        let notifier = Arc::new(RecordingNotifier::new());

        let outcome = coordinator(&backend, &notifier)
            .delete(&ModelVersionId::new("mv-1"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(notifier.last().unwrap().title, "bert version 3 was deleted");
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_unconfirmed_after_budget() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_model_version(version("mv-1", ModelVersionState::Registered))
                .with_delete_lag(u32::MAX),
        );
        let notifier = Arc::new(RecordingNotifier::new());
        let config = OperationsConfig::default()
            .with_delete_confirmation(PollingConfig::bounded(Duration::from_millis(300), 4));
        let coordinator = DeploymentCoordinator::new(
            Arc::clone(&backend) as Arc<dyn MlBackendPort>,
            Arc::clone(&notifier) as Arc<dyn NotifierPort>,
            config,
        );

        let outcome = coordinator
            .delete(&ModelVersionId::new("mv-1"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Unconfirmed { attempts: 4 });
        assert!(notifier.last().unwrap().is_failure());
    }

    #[tokio::test]
    async fn delete_refuses_deployed_version() {
        let backend = Arc::new(
            ScriptedBackend::new().with_model_version(version("mv-1", ModelVersionState::Deployed)),
        );
        let notifier = Arc::new(RecordingNotifier::new());

        let result = coordinator(&backend, &notifier)
            .delete(&ModelVersionId::new("mv-1"), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(LifecycleError::Precondition { .. })));
        assert_eq!(
            backend.model_version_state(&ModelVersionId::new("mv-1")),
            Some(ModelVersionState::Deployed)
        );
    }

    #[tokio::test]
    async fn raw_detail_needs_no_backend_call() {
        let backend = Arc::new(ScriptedBackend::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let detail = coordinator(&backend, &notifier)
            .error_detail(&DetailAction::Raw {
                message: "quota exceeded".into(),
            })
            .await
            .unwrap();

        assert_eq!(detail, "quota exceeded");
        assert!(backend.calls().is_empty());
    }
}
