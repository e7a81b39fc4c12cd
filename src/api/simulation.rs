use super::types::{ClaimedInvite, CurrentTask, RunStarted, Submission, SubmitReceipt, Workspace};
use crate::client::{RequestClient, RequestDescriptor};
use crate::polling::PollResult;
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// TTL for the current-task lookup; it is read by several views at once.
pub const CURRENT_TASK_TTL: Duration = Duration::from_secs(3);

/// Typed calls for the candidate simulation endpoints.
#[derive(Clone)]
pub struct SimulationApi {
    client: Arc<RequestClient>,
}

impl SimulationApi {
    pub fn new(client: Arc<RequestClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<RequestClient> {
        &self.client
    }

    /// Claim an invite. Concurrent claims of the same token share one call.
    pub async fn claim_invite(&self, token: &str) -> Result<ClaimedInvite> {
        let token = path_segment("invite.token", token)?;
        let descriptor = RequestDescriptor::post(format!("/api/candidate/invites/{}/claim", token))
            .with_dedupe_key(format!("invite-claim:{}", token));
        self.client.execute(descriptor).await
    }

    pub async fn current_task(&self, simulation_id: &str) -> Result<CurrentTask> {
        let id = path_segment("simulation.id", simulation_id)?;
        let descriptor =
            RequestDescriptor::get(format!("/api/candidate/simulations/{}/current-task", id))
                .with_cache_ttl(CURRENT_TASK_TTL);
        self.client.execute(descriptor).await
    }

    /// Drop the cached lookup for `simulation_id`, then fetch and re-cache it.
    pub async fn refresh_current_task(&self, simulation_id: &str) -> Result<CurrentTask> {
        let id = path_segment("simulation.id", simulation_id)?;
        self.client
            .invalidate_path(&format!("/api/candidate/simulations/{}/", id))?;
        self.current_task(id).await
    }

    pub async fn provision_workspace(&self, task_id: &str) -> Result<Workspace> {
        let id = path_segment("task.id", task_id)?;
        let descriptor = RequestDescriptor::post(format!("/api/tasks/{}/workspace", id))
            .with_dedupe_key(format!("workspace:{}", id));
        self.client.execute(descriptor).await
    }

    pub async fn start_test_run(&self, task_id: &str) -> Result<RunStarted> {
        let id = path_segment("task.id", task_id)?;
        self.client
            .execute(RequestDescriptor::post(format!("/api/tasks/{}/run", id)))
            .await
    }

    /// Status of a test run. Never served from cache.
    pub async fn poll_test_run(&self, task_id: &str, run_id: &str) -> Result<PollResult> {
        let id = path_segment("task.id", task_id)?;
        let run = path_segment("run.id", run_id)?;
        let descriptor =
            RequestDescriptor::get(format!("/api/tasks/{}/run/{}", id, run)).skip_cache();
        self.client.execute(descriptor).await
    }

    /// Submit a task, then drop cached current-task lookups so the next read
    /// sees the advanced simulation.
    pub async fn submit_task(&self, task_id: &str, submission: &Submission) -> Result<SubmitReceipt> {
        let id = path_segment("task.id", task_id)?;
        let body = serde_json::to_value(submission).map_err(|e| {
            Error::runtime_with_context(
                format!("cannot encode submission: {}", e),
                ErrorContext::new()
                    .with_field_path("submission")
                    .with_source("simulation_api"),
            )
        })?;
        let receipt = self
            .client
            .execute(
                RequestDescriptor::post(format!("/api/tasks/{}/submit", id))
                    .with_json(body)
                    .with_dedupe_key(format!("submit:{}", id)),
            )
            .await?;
        let removed = self.client.invalidate_path("/api/candidate/simulations/")?;
        debug!(task_id = id, removed, "submitted task");
        Ok(receipt)
    }
}

/// Ids and tokens are interpolated into paths, so only URL-unreserved
/// characters are accepted.
fn path_segment<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'));
    if valid && value != "." && value != ".." {
        Ok(value)
    } else {
        Err(Error::configuration_with_context(
            format!("invalid {}", field),
            ErrorContext::new()
                .with_field_path(field)
                .with_details(value.to_string())
                .with_source("simulation_api"),
        ))
    }
}
