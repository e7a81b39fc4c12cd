//! Run states and poll results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one engine instance.
///
/// `Success`, `Failed`, `Timeout` and `Error` are terminal until a new run is
/// started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Success,
    Failed,
    Timeout,
    Error,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Success | RunState::Failed | RunState::Timeout | RunState::Error
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Starting | RunState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Success => "success",
            RunState::Failed => "failed",
            RunState::Timeout => "timeout",
            RunState::Error => "error",
        }
    }

    /// Default user-facing line for the state.
    pub fn summary(&self) -> &'static str {
        match self {
            RunState::Idle => "No test run yet.",
            RunState::Starting => "Starting test run...",
            RunState::Running => "Tests are running...",
            RunState::Success => "All tests passed.",
            RunState::Failed => "Some tests failed.",
            RunState::Timeout => "The test run timed out.",
            RunState::Error => "The test run could not be completed.",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job status as reported by a poll. Unknown strings are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PollStatus {
    Running,
    Passed,
    Failed,
    Timeout,
    Error,
    Other(String),
}

impl PollStatus {
    /// Terminal engine state for this status, `None` while the job is running.
    pub fn terminal_state(&self) -> Option<RunState> {
        match self {
            PollStatus::Running => None,
            PollStatus::Passed => Some(RunState::Success),
            PollStatus::Failed => Some(RunState::Failed),
            PollStatus::Timeout => Some(RunState::Timeout),
            PollStatus::Error | PollStatus::Other(_) => Some(RunState::Error),
        }
    }
}

impl From<String> for PollStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" | "queued" | "pending" | "in_progress" => PollStatus::Running,
            "passed" => PollStatus::Passed,
            "failed" => PollStatus::Failed,
            "timeout" => PollStatus::Timeout,
            "error" => PollStatus::Error,
            _ => PollStatus::Other(s),
        }
    }
}

impl From<PollStatus> for String {
    fn from(status: PollStatus) -> Self {
        match status {
            PollStatus::Running => "running".into(),
            PollStatus::Passed => "passed".into(),
            PollStatus::Failed => "failed".into(),
            PollStatus::Timeout => "timeout".into(),
            PollStatus::Error => "error".into(),
            PollStatus::Other(s) => s,
        }
    }
}

/// One poll response. The latest one is kept for display after the run ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub status: PollStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, alias = "workflow_url", skip_serializing_if = "Option::is_none")]
    pub workflow_url: Option<String>,
    #[serde(default, alias = "commit_sha", skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default, alias = "run_id", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl PollResult {
    pub fn new(status: PollStatus) -> Self {
        Self {
            status,
            message: None,
            passed: None,
            failed: None,
            total: None,
            stdout: None,
            stderr: None,
            workflow_url: None,
            commit_sha: None,
            run_id: None,
        }
    }

    pub fn running() -> Self {
        Self::new(PollStatus::Running)
    }

    pub fn with_counts(mut self, passed: u32, failed: u32, total: u32) -> Self {
        self.passed = Some(passed);
        self.failed = Some(failed);
        self.total = Some(total);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_workflow_url(mut self, url: impl Into<String>) -> Self {
        self.workflow_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_mapping() {
        assert_eq!(PollStatus::Running.terminal_state(), None);
        assert_eq!(PollStatus::Passed.terminal_state(), Some(RunState::Success));
        assert_eq!(PollStatus::Failed.terminal_state(), Some(RunState::Failed));
        assert_eq!(PollStatus::Timeout.terminal_state(), Some(RunState::Timeout));
        assert_eq!(PollStatus::Error.terminal_state(), Some(RunState::Error));
        assert_eq!(
            PollStatus::from("cancelled".to_string()).terminal_state(),
            Some(RunState::Error)
        );
    }

    #[test]
    fn test_deserialize_backend_shape() {
        let result: PollResult = serde_json::from_value(json!({
            "status": "passed",
            "passed": 10,
            "failed": 0,
            "total": 10,
            "stdout": "ok",
            "workflowUrl": "https://ci.example.com/runs/9",
            "commit_sha": "abc123",
            "runId": "9"
        }))
        .unwrap();
        assert_eq!(result.status, PollStatus::Passed);
        assert_eq!(result.total, Some(10));
        assert_eq!(result.workflow_url.as_deref(), Some("https://ci.example.com/runs/9"));
        assert_eq!(result.commit_sha.as_deref(), Some("abc123"));
        assert_eq!(result.run_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let result: PollResult = serde_json::from_value(json!({"status": "Cancelled"})).unwrap();
        assert_eq!(result.status, PollStatus::Other("Cancelled".into()));
        let back = serde_json::to_value(&result).unwrap();
        assert_eq!(back, json!({"status": "Cancelled"}));
    }

    #[test]
    fn test_state_flags() {
        assert!(RunState::Timeout.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Starting.is_active());
        assert_eq!(RunState::Success.to_string(), "success");
        assert_eq!(
            serde_json::to_value(RunState::Failed).unwrap(),
            json!("failed")
        );
    }
}
