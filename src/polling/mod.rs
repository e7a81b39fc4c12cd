//! 轮询模块：带退避、可见性暂停与运行 ID 持久化的长任务轮询引擎。
//!
//! # Polling Module
//!
//! Drives a remote long-running job (start, poll until terminal) with growing
//! delays between polls.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BackoffPoller`] | State machine with run lock, limits and visibility pause |
//! | [`JobSource`] | The remote job: `start` and `poll` |
//! | [`BackoffPolicy`] | Exponential, linear or constant delay schedule |
//! | [`PollerConfig`] | Attempt and duration limits plus the storage key |
//! | [`Scheduler`] | Timer seam; [`TokioScheduler`] in production |
//! | [`VisibilitySource`] | Foreground/background signal |
//! | [`KeyValueStore`] | Session store for the active run id |

mod backoff;
mod config;
mod engine;
mod result;
mod scheduler;
mod storage;
mod visibility;

pub use backoff::{BackoffPolicy, Growth};
pub use config::PollerConfig;
pub use engine::{
    BackoffPoller, BackoffPollerBuilder, JobSource, PollerSnapshot, HARD_LIMIT_MESSAGE,
    START_FAILED_MESSAGE,
};
pub use result::{PollResult, PollStatus, RunState};
pub use scheduler::{Scheduler, TimerHandle, TokioScheduler};
pub use storage::{KeyValueStore, MemoryStore};
pub use visibility::{AlwaysVisible, DocumentVisibility, ListenerId, VisibilitySource, VisibleCallback};
