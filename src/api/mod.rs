//! Candidate simulation endpoints on top of [`RequestClient`](crate::client::RequestClient).
//!
//! [`SimulationApi`] wraps each endpoint with the cache and dedupe policy it
//! needs; [`TestRunJob`] plugs test runs into the polling engine; the
//! bootstrap helpers build initializers for the invite and current-task flows.

mod bootstrap;
mod simulation;
mod test_run;
mod types;

pub use bootstrap::{current_task_loader, invite_claimer};
pub use simulation::{SimulationApi, CURRENT_TASK_TTL};
pub use test_run::{mount_test_run_poller, test_run_poller, test_run_storage_key, TestRunJob};
pub use types::{ClaimedInvite, CurrentTask, RunStarted, Submission, SubmitReceipt, TaskSummary, Workspace};
