use super::config::PollerConfig;
use super::result::{PollResult, RunState};
use super::scheduler::{Scheduler, TimerHandle, TokioScheduler};
use super::storage::{KeyValueStore, MemoryStore};
use super::visibility::{AlwaysVisible, ListenerId, VisibilitySource};
use crate::Result;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Message shown when a run is abandoned on attempt or duration limits.
pub const HARD_LIMIT_MESSAGE: &str =
    "Tests are still running. Check the workflow link for progress.";

/// Message used when starting a run fails without a usable error message.
pub const START_FAILED_MESSAGE: &str = "Failed to start test run.";

/// The remote job driven by an engine.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Start a new job and return its id. Must fail if the job did not start.
    async fn start(&self) -> Result<String>;

    /// Current status of `run_id`. A job that is still running is `Ok`; errors
    /// are reserved for failures to obtain the status.
    async fn poll(&self, run_id: &str) -> Result<PollResult>;
}

/// Observable view of an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerSnapshot {
    pub state: RunState,
    pub last_result: Option<PollResult>,
    pub message: Option<String>,
    pub run_id: Option<String>,
    /// Poll calls issued for the current run.
    pub attempts: u32,
    pub locked: bool,
    /// A poll is waiting for the host to become visible.
    pub paused: bool,
}

#[derive(Debug, Clone)]
struct Pending {
    attempt: u32,
    run_id: String,
}

struct Core {
    state: RunState,
    last_result: Option<PollResult>,
    message: Option<String>,
    run_id: Option<String>,
    attempts: u32,
    locked: bool,
    pending: Option<Pending>,
    started_at: Option<Instant>,
    timer: Option<TimerHandle>,
    /// Bumped on every new run and on dispose; work tagged with an older
    /// generation is discarded.
    generation: u64,
    disposed: bool,
}

impl Core {
    fn snapshot(&self) -> PollerSnapshot {
        PollerSnapshot {
            state: self.state,
            last_result: self.last_result.clone(),
            message: self.message.clone(),
            run_id: self.run_id.clone(),
            attempts: self.attempts,
            locked: self.locked,
            paused: self.pending.is_some(),
        }
    }
}

struct Inner {
    config: PollerConfig,
    job: Arc<dyn JobSource>,
    store: Arc<dyn KeyValueStore>,
    visibility: Arc<dyn VisibilitySource>,
    scheduler: Arc<dyn Scheduler>,
    core: Mutex<Core>,
    updates: watch::Sender<PollerSnapshot>,
}

/// Builder for [`BackoffPoller`].
pub struct BackoffPollerBuilder {
    config: PollerConfig,
    job: Arc<dyn JobSource>,
    store: Option<Arc<dyn KeyValueStore>>,
    visibility: Option<Arc<dyn VisibilitySource>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl BackoffPollerBuilder {
    /// Store for the active run id. Defaults to a private [`MemoryStore`],
    /// which only survives as long as this engine.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Visibility signal. Defaults to [`AlwaysVisible`].
    pub fn visibility(mut self, visibility: Arc<dyn VisibilitySource>) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Timer scheduler. Defaults to [`TokioScheduler`].
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Result<BackoffPoller> {
        self.config.validate()?;

        let core = Core {
            state: RunState::Idle,
            last_result: None,
            message: None,
            run_id: None,
            attempts: 0,
            locked: false,
            pending: None,
            started_at: None,
            timer: None,
            generation: 0,
            disposed: false,
        };
        let (updates, _) = watch::channel(core.snapshot());

        let inner = Arc::new(Inner {
            config: self.config,
            job: self.job,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>),
            visibility: self
                .visibility
                .unwrap_or_else(|| Arc::new(AlwaysVisible) as Arc<dyn VisibilitySource>),
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(TokioScheduler::new()) as Arc<dyn Scheduler>),
            core: Mutex::new(core),
            updates,
        });

        let weak = Arc::downgrade(&inner);
        let listener = inner.visibility.on_visible(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.resume_pending();
            }
        }));

        Ok(BackoffPoller {
            inner,
            listener: Mutex::new(Some(listener)),
        })
    }
}

/// Start/poll/terminal state machine for one logical job slot.
///
/// ```text
/// idle ──start_run──► starting ──job started──► running ──┬──► success
///                        │                       ▲   │    ├──► failed
///                        └──start failed──► error │   │    ├──► timeout
///                                                 └───┘    └──► error
///                                               poll: running
/// ```
///
/// * At most one run per instance: `start_run` is refused while a run is
///   active.
/// * Poll delays come from the configured [`BackoffPolicy`](super::BackoffPolicy);
///   every poll call, failed or not, consumes one unit of the attempt budget.
/// * While the host is hidden no new poll is issued; the next attempt is
///   stashed and resumed from the same attempt number once visible.
/// * The run id is persisted under the configured key so [`mount`](Self::mount)
///   on a fresh instance can reattach to a run left behind.
///
/// The engine never returns errors from its operations; outcomes are reported
/// through [`state`](Self::state), [`message`](Self::message) and
/// [`subscribe`](Self::subscribe). All methods that start work must be called
/// from within a Tokio runtime.
pub struct BackoffPoller {
    inner: Arc<Inner>,
    listener: Mutex<Option<ListenerId>>,
}

impl BackoffPoller {
    pub fn builder(config: PollerConfig, job: Arc<dyn JobSource>) -> BackoffPollerBuilder {
        BackoffPollerBuilder {
            config,
            job,
            store: None,
            visibility: None,
            scheduler: None,
        }
    }

    /// Reattach to a run persisted by an earlier instance, if any.
    pub fn mount(&self) -> bool {
        let key = &self.inner.config.storage_key;
        match self.inner.store.get(key) {
            Ok(Some(run_id)) if !run_id.trim().is_empty() => {
                let idle = {
                    let core = self.inner.lock();
                    core.state == RunState::Idle && !core.locked
                };
                if !idle {
                    return false;
                }
                info!(storage_key = key.as_str(), run_id = run_id.as_str(), "resuming stored run");
                self.inner.adopt(run_id)
            }
            Ok(_) => false,
            Err(e) => {
                warn!(storage_key = key.as_str(), error = %e, "could not read stored run id");
                false
            }
        }
    }

    /// Start a new run. Returns `false` when a run is already active.
    pub fn start_run(&self) -> bool {
        self.inner.start_run()
    }

    /// Adopt `run_id` as the active run and start polling it without calling
    /// [`JobSource::start`]. Ignored while a run is active.
    pub fn resume_stored(&self, run_id: impl Into<String>) -> bool {
        self.inner.adopt(run_id.into())
    }

    /// Return a finished engine to `idle`, clearing the last result.
    pub fn reset(&self) -> bool {
        let mut core = self.inner.lock();
        if core.locked || core.disposed {
            return false;
        }
        core.state = RunState::Idle;
        core.last_result = None;
        core.message = None;
        core.run_id = None;
        core.attempts = 0;
        self.inner.publish(&core);
        true
    }

    /// Tear down: cancel the pending timer, clear guards and stop listening for
    /// visibility changes. The remote job and the persisted run id are left
    /// alone so a later instance can resume.
    pub fn dispose(&self) {
        {
            let mut core = self.inner.lock();
            if core.disposed {
                return;
            }
            core.disposed = true;
            core.generation += 1;
            if let Some(timer) = core.timer.take() {
                self.inner.scheduler.cancel(timer);
            }
            core.locked = false;
            core.pending = None;
            core.started_at = None;
            self.inner.publish(&core);
        }
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(id) = listener {
            self.inner.visibility.remove_listener(id);
        }
        debug!(storage_key = self.inner.config.storage_key.as_str(), "poller disposed");
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().state
    }

    pub fn last_result(&self) -> Option<PollResult> {
        self.inner.lock().last_result.clone()
    }

    pub fn message(&self) -> Option<String> {
        self.inner.lock().message.clone()
    }

    pub fn run_id(&self) -> Option<String> {
        self.inner.lock().run_id.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().locked
    }

    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn snapshot(&self) -> PollerSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn config(&self) -> &PollerConfig {
        &self.inner.config
    }
}

impl Drop for BackoffPoller {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, core: &Core) {
        self.updates.send_replace(core.snapshot());
    }

    fn start_run(self: &Arc<Self>) -> bool {
        let generation = {
            let mut core = self.lock();
            if core.disposed {
                return false;
            }
            if core.locked {
                debug!(
                    storage_key = self.config.storage_key.as_str(),
                    "start_run ignored: run already active"
                );
                return false;
            }
            core.generation += 1;
            core.locked = true;
            core.state = RunState::Starting;
            core.last_result = None;
            core.message = None;
            core.run_id = None;
            core.attempts = 0;
            core.pending = None;
            core.started_at = Some(Instant::now());
            if let Some(timer) = core.timer.take() {
                self.scheduler.cancel(timer);
            }
            self.publish(&core);
            core.generation
        };

        info!(storage_key = self.config.storage_key.as_str(), "starting run");
        let inner = self.clone();
        tokio::spawn(async move {
            let started = inner.job.start().await;
            inner.on_started(generation, started);
        });
        true
    }

    fn on_started(self: &Arc<Self>, generation: u64, started: Result<String>) {
        let mut core = self.lock();
        if core.disposed || core.generation != generation {
            return;
        }
        match started {
            Ok(run_id) => {
                info!(
                    storage_key = self.config.storage_key.as_str(),
                    run_id = run_id.as_str(),
                    "run started"
                );
                self.persist(&run_id);
                let poll_now = self.enter_running(&mut core, run_id);
                drop(core);
                if let Some(run_id) = poll_now {
                    self.spawn_attempt(generation, run_id, 0);
                }
            }
            Err(e) => {
                let message = e.message();
                let message = if message.trim().is_empty() {
                    START_FAILED_MESSAGE.to_string()
                } else {
                    message
                };
                info!(
                    storage_key = self.config.storage_key.as_str(),
                    error = message.as_str(),
                    "run failed to start"
                );
                core.state = RunState::Error;
                core.message = Some(message);
                self.release(&mut core);
                self.publish(&core);
            }
        }
    }

    /// Take over an existing run id (stored or supplied) without starting a job.
    fn adopt(self: &Arc<Self>, run_id: String) -> bool {
        let (generation, poll_now) = {
            let mut core = self.lock();
            if core.disposed || core.locked {
                return false;
            }
            core.generation += 1;
            core.locked = true;
            core.last_result = None;
            core.message = None;
            core.pending = None;
            core.started_at = Some(Instant::now());
            if let Some(timer) = core.timer.take() {
                self.scheduler.cancel(timer);
            }
            self.persist(&run_id);
            let poll_now = self.enter_running(&mut core, run_id);
            (core.generation, poll_now)
        };
        if let Some(run_id) = poll_now {
            self.spawn_attempt(generation, run_id, 0);
        }
        true
    }

    /// Move to `running`. Returns the run id when the first poll should be
    /// issued right away, `None` when it was stashed because the host is hidden.
    fn enter_running(&self, core: &mut Core, run_id: String) -> Option<String> {
        core.state = RunState::Running;
        core.run_id = Some(run_id.clone());
        core.attempts = 0;
        let poll_now = if self.visibility.is_visible() {
            Some(run_id)
        } else {
            debug!(run_id = run_id.as_str(), "host hidden; deferring first poll");
            core.pending = Some(Pending { attempt: 0, run_id });
            None
        };
        self.publish(core);
        poll_now
    }

    fn spawn_attempt(self: &Arc<Self>, generation: u64, run_id: String, attempt: u32) {
        tokio::spawn(self.clone().attempt(generation, run_id, attempt));
    }

    fn attempt(self: Arc<Self>, generation: u64, run_id: String, attempt: u32) -> BoxFuture<'static, ()> {
        async move {
            {
                let mut core = self.lock();
                if core.disposed || core.generation != generation || core.state != RunState::Running {
                    return;
                }
                core.timer = None;
                if self.limits_exceeded(&core, attempt) {
                    self.hard_stop(&mut core, attempt);
                    self.publish(&core);
                    return;
                }
                if !self.visibility.is_visible() {
                    debug!(run_id = run_id.as_str(), attempt, "host hidden; pausing poll");
                    core.pending = Some(Pending { attempt, run_id });
                    self.publish(&core);
                    return;
                }
                core.attempts = attempt + 1;
                self.publish(&core);
            }

            let polled = self.job.poll(&run_id).await;

            let mut core = self.lock();
            if core.disposed || core.generation != generation || core.state != RunState::Running {
                return;
            }
            let next = attempt + 1;
            match polled {
                Ok(result) => {
                    core.message = result.message.clone();
                    let terminal = result.status.terminal_state();
                    core.last_result = Some(result);
                    if let Some(state) = terminal {
                        info!(run_id = run_id.as_str(), state = %state, attempts = next, "run finished");
                        core.state = state;
                        if core.message.is_none() {
                            core.message = Some(state.summary().to_string());
                        }
                        self.release(&mut core);
                        self.publish(&core);
                        return;
                    }
                }
                Err(e) => {
                    warn!(run_id = run_id.as_str(), attempt, error = %e, "poll failed; will retry");
                    core.message = Some(e.message());
                }
            }

            if self.limits_exceeded(&core, next) {
                self.hard_stop(&mut core, next);
                self.publish(&core);
                return;
            }
            if !self.visibility.is_visible() {
                debug!(run_id = run_id.as_str(), attempt = next, "host hidden; pausing poll");
                core.pending = Some(Pending {
                    attempt: next,
                    run_id,
                });
                self.publish(&core);
                return;
            }

            let delay = self.config.backoff.delay(next);
            debug!(
                run_id = run_id.as_str(),
                attempt = next,
                delay_ms = delay.as_millis() as u64,
                "scheduling next poll"
            );
            let task = self.clone().attempt(generation, run_id, next);
            core.timer = Some(self.scheduler.schedule_after(delay, task));
            self.publish(&core);
        }
        .boxed()
    }

    fn limits_exceeded(&self, core: &Core, attempt: u32) -> bool {
        attempt >= self.config.max_attempts
            || core
                .started_at
                .map(|t| t.elapsed() > self.config.max_duration)
                .unwrap_or(false)
    }

    fn hard_stop(&self, core: &mut Core, attempts: u32) {
        warn!(
            run_id = core.run_id.as_deref().unwrap_or_default(),
            attempts,
            max_attempts = self.config.max_attempts,
            "polling limit reached; giving up on run"
        );
        core.state = RunState::Error;
        core.message = Some(HARD_LIMIT_MESSAGE.to_string());
        self.release(core);
    }

    /// Visibility came back: continue from the stashed attempt.
    fn resume_pending(self: &Arc<Self>) {
        let (generation, pending) = {
            let mut core = self.lock();
            if core.disposed || core.state != RunState::Running {
                return;
            }
            match core.pending.take() {
                Some(p) => (core.generation, p),
                None => return,
            }
        };
        debug!(
            run_id = pending.run_id.as_str(),
            attempt = pending.attempt,
            "host visible; resuming poll"
        );
        self.spawn_attempt(generation, pending.run_id, pending.attempt);
    }

    /// Terminal bookkeeping: unlock, drop guards and forget the persisted run.
    fn release(&self, core: &mut Core) {
        core.locked = false;
        core.pending = None;
        core.started_at = None;
        if let Some(timer) = core.timer.take() {
            self.scheduler.cancel(timer);
        }
        if let Err(e) = self.store.remove(&self.config.storage_key) {
            warn!(storage_key = self.config.storage_key.as_str(), error = %e, "could not clear stored run id");
        }
    }

    fn persist(&self, run_id: &str) {
        if let Err(e) = self.store.set(&self.config.storage_key, run_id) {
            warn!(storage_key = self.config.storage_key.as_str(), error = %e, "could not persist run id");
        }
    }
}
