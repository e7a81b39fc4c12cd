//! Wire types for the simulation endpoints.

use serde::{Deserialize, Deserializer, Serialize};

/// Backend ids arrive as numbers or strings depending on the endpoint.
pub(crate) fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Num(n) => n.to_string(),
        Raw::Str(s) => s,
    })
}

fn opt_id_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "id_string")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedInvite {
    #[serde(alias = "simulation_id", deserialize_with = "id_string")]
    pub simulation_id: String,
    #[serde(default, alias = "candidate_session_id", deserialize_with = "opt_id_string")]
    pub candidate_session_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, alias = "day_index")]
    pub day_index: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    /// `code`, `design`, `documentation`, ...
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Response of the current-task endpoint. `current_task` is absent once every
/// task of the simulation is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentTask {
    #[serde(default, alias = "simulation_id", deserialize_with = "opt_id_string")]
    pub simulation_id: Option<String>,
    #[serde(default, alias = "current_task")]
    pub current_task: Option<TaskSummary>,
    #[serde(default, alias = "completed_task_ids")]
    pub completed_task_ids: Vec<serde_json::Value>,
    #[serde(default, alias = "is_complete")]
    pub is_complete: bool,
}

impl CurrentTask {
    pub fn task_id(&self) -> Option<&str> {
        self.current_task.as_ref().map(|t| t.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    #[serde(default, alias = "repo_url")]
    pub repo_url: Option<String>,
    #[serde(default, alias = "repo_full_name")]
    pub repo_full_name: Option<String>,
    #[serde(default, alias = "codespace_url")]
    pub codespace_url: Option<String>,
    #[serde(default, alias = "default_branch")]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    #[serde(alias = "run_id", deserialize_with = "id_string")]
    pub run_id: String,
    #[serde(default, alias = "workflow_url")]
    pub workflow_url: Option<String>,
}

/// Body of a task submission; text for written tasks, branch/commit for code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

impl Submission {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content_text: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn code(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            ..Self::default()
        }
    }

    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    #[serde(default, alias = "submission_id", deserialize_with = "opt_id_string")]
    pub submission_id: Option<String>,
    #[serde(default, alias = "submitted_at")]
    pub submitted_at: Option<String>,
    #[serde(default, alias = "next_task_id", deserialize_with = "opt_id_string")]
    pub next_task_id: Option<String>,
    #[serde(default, alias = "is_complete")]
    pub is_complete: bool,
}
