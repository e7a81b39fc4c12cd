//! Simulation endpoints over the reqwest transport against a mockito server.

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use simrun_core::api::{
    current_task_loader, invite_claimer, test_run_poller, test_run_storage_key, SimulationApi,
    Submission,
};
use simrun_core::client::StaticToken;
use simrun_core::polling::{KeyValueStore, MemoryStore, PollStatus};
use simrun_core::{Disposition, Error, RequestClient, RunState};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn api_for(server: &ServerGuard) -> SimulationApi {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let client = RequestClient::builder()
        .base_url(server.url())
        .token_source(Arc::new(StaticToken::new("cand-token")))
        .build()
        .expect("client");
    SimulationApi::new(Arc::new(client))
}

#[tokio::test]
async fn test_concurrent_invite_claims_share_one_request() {
    let mut server = Server::new_async().await;
    let claim = server
        .mock("POST", "/api/candidate/invites/inv-abc/claim")
        .match_header("authorization", "Bearer cand-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"simulationId": 12, "candidateSessionId": 301, "title": "Backend Week"}"#)
        .expect(1)
        .create_async()
        .await;
    let api = api_for(&server);

    let (a, b) = tokio::join!(api.claim_invite("inv-abc"), api.claim_invite("inv-abc"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert_eq!(a.simulation_id, "12");
    assert_eq!(a.candidate_session_id.as_deref(), Some("301"));
    claim.assert_async().await;
}

#[tokio::test]
async fn test_claim_error_carries_backend_message() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/candidate/invites/old/claim")
        .with_status(410)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail": "Invite expired"}"#)
        .create_async()
        .await;
    let api = api_for(&server);

    let err = api.claim_invite("old").await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 410, .. }));
    assert_eq!(err.message(), "Invite expired");

    let err = api.claim_invite("../admin").await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[tokio::test]
async fn test_current_task_is_cached_until_submit() {
    let mut server = Server::new_async().await;
    let current = server
        .mock("GET", "/api/candidate/simulations/12/current-task")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"simulationId": 12, "currentTask": {"id": 7, "dayIndex": 1, "type": "code"}}"#)
        .expect(2)
        .create_async()
        .await;
    let submit = server
        .mock("POST", "/api/tasks/7/submit")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"branch": "main", "commitSha": "abc123"})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"submissionId": 55, "nextTaskId": 8}"#)
        .expect(1)
        .create_async()
        .await;
    let api = api_for(&server);

    let first = api.current_task("12").await.unwrap();
    let second = api.current_task("12").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.task_id(), Some("7"));

    let receipt = api
        .submit_task("7", &Submission::code("main").with_commit("abc123"))
        .await
        .unwrap();
    assert_eq!(receipt.submission_id.as_deref(), Some("55"));
    assert_eq!(receipt.next_task_id.as_deref(), Some("8"));

    api.current_task("12").await.unwrap();
    current.assert_async().await;
    submit.assert_async().await;
}

#[tokio::test]
async fn test_workspace_provisioning() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/tasks/7/workspace")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"repoFullName": "acme/sim-12", "codespaceUrl": "https://codespaces.example.com/x"}"#)
        .create_async()
        .await;
    let api = api_for(&server);

    let ws = api.provision_workspace("7").await.unwrap();
    assert_eq!(ws.repo_full_name.as_deref(), Some("acme/sim-12"));
    assert!(ws.repo_url.is_none());
}

#[tokio::test]
async fn test_test_run_polls_to_completion() {
    let mut server = Server::new_async().await;
    let start = server
        .mock("POST", "/api/tasks/7/run")
        .with_status(202)
        .with_header("content-type", "application/json")
        .with_body(r#"{"runId": 99}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/tasks/7/run/99")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "passed", "passed": 4, "failed": 0, "total": 4, "commitSha": "abc"}"#)
        .create_async()
        .await;
    let api = api_for(&server);
    let store = Arc::new(MemoryStore::new());

    let poller = test_run_poller(api, "7").store(store.clone()).build().unwrap();
    let mut updates = poller.subscribe();
    assert!(poller.start_run());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !updates.borrow_and_update().state.is_terminal() {
            updates.changed().await.unwrap();
        }
    })
    .await
    .expect("run should finish");

    assert_eq!(poller.state(), RunState::Success);
    let result = poller.last_result().unwrap();
    assert_eq!(result.status, PollStatus::Passed);
    assert_eq!(result.total, Some(4));
    assert_eq!(result.commit_sha.as_deref(), Some("abc"));
    assert_eq!(store.get(&test_run_storage_key("7")).unwrap(), None);
    start.assert_async().await;
}

#[tokio::test]
async fn test_bootstrap_initializers_run_once() {
    let mut server = Server::new_async().await;
    let claim = server
        .mock("POST", "/api/candidate/invites/inv-1/claim")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"simulationId": "sim-9"}"#)
        .expect(1)
        .create_async()
        .await;
    let current = server
        .mock("GET", "/api/candidate/simulations/sim-9/current-task")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"currentTask": null, "isComplete": true}"#)
        .expect(2)
        .create_async()
        .await;
    let api = api_for(&server);

    let claimed = Arc::new(Mutex::new(Vec::new()));
    let sink = claimed.clone();
    let claimer = invite_claimer(api.clone(), move |invite| {
        sink.lock().unwrap().push(invite.simulation_id);
    });

    let (a, b) = tokio::join!(
        claimer.run("inv-1".to_string(), false),
        claimer.run("inv-1".to_string(), false),
    );
    assert_eq!(a.unwrap(), Disposition::Executed);
    assert_eq!(b.unwrap(), Disposition::InFlight);
    assert_eq!(
        claimer.run("inv-1".to_string(), false).await.unwrap(),
        Disposition::AlreadyDone
    );
    assert_eq!(*claimed.lock().unwrap(), vec!["sim-9".to_string()]);
    claim.assert_async().await;

    let loaded = Arc::new(Mutex::new(0usize));
    let counter = loaded.clone();
    let loader = current_task_loader(api.clone(), move |_, task| {
        assert!(task.is_complete);
        *counter.lock().unwrap() += 1;
    });
    loader.run("sim-9".to_string(), false).await.unwrap();
    loader.run("sim-9".to_string(), false).await.unwrap();
    loader.run("sim-9".to_string(), true).await.unwrap();
    assert_eq!(*loaded.lock().unwrap(), 2);
    current.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let client = RequestClient::builder()
        .base_url("http://127.0.0.1:9/")
        .token_source(Arc::new(StaticToken::new("t")))
        .build()
        .unwrap();
    let api = SimulationApi::new(Arc::new(client));

    let err = api.current_task("1").await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(err.status(), 0);
}
