use super::simulation::SimulationApi;
use crate::polling::{
    BackoffPoller, BackoffPollerBuilder, JobSource, KeyValueStore, PollResult, PollerConfig,
    VisibilitySource,
};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Session key under which the active test run of `task_id` is persisted.
pub fn test_run_storage_key(task_id: &str) -> String {
    format!("simrun:test-run:{}", task_id)
}

/// CI test runs of one task as a [`JobSource`].
#[derive(Clone)]
pub struct TestRunJob {
    api: SimulationApi,
    task_id: String,
}

impl TestRunJob {
    pub fn new(api: SimulationApi, task_id: impl Into<String>) -> Self {
        Self {
            api,
            task_id: task_id.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

#[async_trait]
impl JobSource for TestRunJob {
    async fn start(&self) -> Result<String> {
        Ok(self.api.start_test_run(&self.task_id).await?.run_id)
    }

    async fn poll(&self, run_id: &str) -> Result<PollResult> {
        self.api.poll_test_run(&self.task_id, run_id).await
    }
}

/// Engine builder for the test runs of `task_id`, with limits from env and
/// the per-task storage key. The caller adds its store and visibility source
/// (shared across instances to allow reattaching) and builds.
pub fn test_run_poller(api: SimulationApi, task_id: &str) -> BackoffPollerBuilder {
    let config = PollerConfig::from_env(test_run_storage_key(task_id));
    BackoffPoller::builder(config, Arc::new(TestRunJob::new(api, task_id)))
}

/// [`test_run_poller`] wired to a shared store and visibility source, mounted
/// so a run left by an earlier instance is picked up.
pub fn mount_test_run_poller(
    api: SimulationApi,
    task_id: &str,
    store: Arc<dyn KeyValueStore>,
    visibility: Arc<dyn VisibilitySource>,
) -> Result<BackoffPoller> {
    let poller = test_run_poller(api, task_id)
        .store(store)
        .visibility(visibility)
        .build()?;
    poller.mount();
    Ok(poller)
}
