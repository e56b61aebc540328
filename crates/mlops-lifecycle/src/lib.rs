//! Model-version lifecycle flows for mlops.
//!
//! Coordinators here combine the backend port, the notifier and the polling
//! primitives from `mlops-tasks` into the operations a UI exposes: deploy,
//! undeploy, delete and upload.
//!
//! # Structure
//!
//! - `deployment` - [`DeploymentCoordinator`] and its outcome types
//! - `upload` - [`ChunkedUploadCoordinator`], chunk planning and fingerprints
//!
//! Use [`build_lifecycle`] to wire both coordinators around one shared
//! [`TaskObservationRegistry`].

#![deny(unused_crate_dependencies)]

mod deployment;
mod upload;

use std::sync::Arc;

use mlops_core::{ConfigError, MlBackendPort, NotifierPort, OperationsConfig};

pub use deployment::{DeleteOutcome, DeployOutcome, DeploymentCoordinator, UndeployOutcome};
pub use mlops_tasks::{QueryOutcome, TaskObservationRegistry};
pub use upload::{
    ArtifactSource, ChunkPlan, ChunkedUploadCoordinator, UploadOutcome, UploadProgress,
    UploadStage,
};

#[cfg(test)]
use anyhow as _;
#[cfg(test)]
use async_trait as _;
#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tracing_subscriber as _;

/// Dependencies for [`build_lifecycle`].
pub struct LifecycleDeps {
    /// Port for the ML backend.
    pub backend: Arc<dyn MlBackendPort>,
    /// Port for user-visible notifications.
    pub notifier: Arc<dyn NotifierPort>,
    pub config: OperationsConfig,
}

/// Coordinators sharing one backend, notifier and task registry.
pub struct LifecycleServices {
    pub deployments: DeploymentCoordinator,
    pub uploads: ChunkedUploadCoordinator,
    pub registry: Arc<TaskObservationRegistry>,
}

/// Validate the configuration and build the lifecycle services.
pub fn build_lifecycle(deps: LifecycleDeps) -> Result<LifecycleServices, ConfigError> {
    deps.config.validate()?;

    let registry = Arc::new(TaskObservationRegistry::from_config(
        Arc::clone(&deps.backend),
        &deps.config,
    ));
    let uploads = ChunkedUploadCoordinator::new(
        Arc::clone(&deps.backend),
        Arc::clone(&deps.notifier),
        Arc::clone(&registry),
        &deps.config,
    )?;
    let deployments = DeploymentCoordinator::new(deps.backend, deps.notifier, deps.config);

    tracing::debug!(target: "mlops.lifecycle", "Lifecycle services ready");

    Ok(LifecycleServices {
        deployments,
        uploads,
        registry,
    })
}

impl LifecycleServices {
    /// Stop every task the registry is following.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }
}
