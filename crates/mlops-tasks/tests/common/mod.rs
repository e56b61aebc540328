//! Shared helpers for mlops-tasks integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mlops_core::MlBackendPort;
use mlops_core::testing::ScriptedBackend;
use mlops_tasks::TaskObservationRegistry;

pub const INTERVAL: Duration = Duration::from_millis(2000);

/// Route `mlops.*` logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mlops=debug")
        .with_test_writer()
        .try_init();
}

pub fn registry_over(backend: &Arc<ScriptedBackend>) -> Arc<TaskObservationRegistry> {
    let backend = Arc::clone(backend) as Arc<dyn MlBackendPort>;
    Arc::new(TaskObservationRegistry::new(backend, INTERVAL))
}

/// Let `n` poll intervals elapse (paused clock).
pub async fn advance_ticks(n: u32) {
    tokio::time::sleep(INTERVAL * n + Duration::from_millis(1)).await;
}
