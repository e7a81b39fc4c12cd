//! # simrun-core
//!
//! 候选人模拟客户端的异步编排核心：请求去重与缓存、幂等初始化、带退避的长任务轮询。
//!
//! Asynchronous orchestration core for a candidate-simulation client.
//!
//! ## Overview
//!
//! Candidates claim invites, load their current task, provision a workspace,
//! trigger CI test runs and submit work. This crate provides the machinery
//! those flows share:
//!
//! - **Request client**: [`RequestClient`] coalesces concurrent identical
//!   calls, caches successful responses for a short TTL (capped at 15 s) and
//!   turns transport and HTTP failures into typed [`Error`]s.
//! - **Initializer**: [`initializer::Initializer`] runs a bootstrap operation
//!   at most once per key, however often it is triggered.
//! - **Polling engine**: [`polling::BackoffPoller`] starts a remote job and
//!   polls it to completion with backoff, bounded attempts and duration,
//!   pauses while the host is hidden and reattaches to a persisted run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use simrun_core::api::{test_run_poller, SimulationApi};
//! use simrun_core::RequestClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> simrun_core::Result<()> {
//!     let client = Arc::new(
//!         RequestClient::builder()
//!             .base_url("https://app.example.com/")
//!             .build()?,
//!     );
//!     let api = SimulationApi::new(client);
//!
//!     let task = api.current_task("42").await?;
//!     if let Some(task_id) = task.task_id() {
//!         let poller = test_run_poller(api.clone(), task_id).build()?;
//!         poller.start_run();
//!         let mut updates = poller.subscribe();
//!         while updates.changed().await.is_ok() {
//!             if updates.borrow().state.is_terminal() {
//!                 break;
//!             }
//!         }
//!         println!("{:?}", poller.message());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Request client, descriptors and builder |
//! | [`cache`] | Request keys and the TTL response cache |
//! | [`transport`] | Transport trait and the reqwest implementation |
//! | [`initializer`] | Idempotent per-key async initializer |
//! | [`polling`] | Backoff polling engine and its seams |
//! | [`api`] | Typed simulation endpoints and test-run job |
//! | [`telemetry`] | Request observers |
//! | [`error`] | Error type |

pub mod api;
pub mod cache;
pub mod client;
pub mod initializer;
pub mod polling;
pub mod telemetry;
pub mod transport;

// Re-export main types for convenience
pub use client::{RequestClient, RequestClientBuilder, RequestDescriptor};
pub use initializer::{Disposition, Initializer};
pub use polling::{BackoffPoller, PollResult, RunState};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
