//! 请求遥测模块：为诊断提供可选的请求观测回调。
//!
//! Request instrumentation.
//!
//! The request client reports every settled call to a [`RequestObserver`]
//! with its method, path, how it was resolved and how long it took. Observers
//! are diagnostics only: they cannot fail a request and their return value is
//! ignored.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RequestEvent`] | One settled call |
//! | [`RequestOutcome`] | `cache`, `dedupe`, `<http status>`, `network` or `aborted` |
//! | [`NoopObserver`] | Default observer (no collection) |
//! | [`TracingObserver`] | Forwards events to `tracing` at debug level |
//! | [`InMemoryObserver`] | Bounded in-memory buffer for tests |

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// How a call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Cache,
    Dedupe,
    Status(u16),
    Network,
    Aborted,
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOutcome::Cache => f.write_str("cache"),
            RequestOutcome::Dedupe => f.write_str("dedupe"),
            RequestOutcome::Status(code) => write!(f, "{}", code),
            RequestOutcome::Network => f.write_str("network"),
            RequestOutcome::Aborted => f.write_str("aborted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub method: String,
    pub path: String,
    pub outcome: RequestOutcome,
    pub elapsed: Duration,
}

pub trait RequestObserver: Send + Sync {
    fn observe(&self, event: &RequestEvent);
}

pub struct NoopObserver;

impl RequestObserver for NoopObserver {
    fn observe(&self, _: &RequestEvent) {}
}

pub fn noop_observer() -> Arc<dyn RequestObserver> {
    Arc::new(NoopObserver)
}

/// Observer that logs each event through `tracing`.
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn observe(&self, event: &RequestEvent) {
        tracing::debug!(
            method = event.method.as_str(),
            path = event.path.as_str(),
            outcome = %event.outcome,
            duration_ms = event.elapsed.as_millis() as u64,
            "request settled"
        );
    }
}

/// In-memory observer for testing.
pub struct InMemoryObserver {
    events: RwLock<Vec<RequestEvent>>,
    max_events: usize,
}

impl InMemoryObserver {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events: max,
        }
    }

    pub fn events(&self) -> Vec<RequestEvent> {
        self.events
            .read()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn outcomes(&self) -> Vec<RequestOutcome> {
        self.events().into_iter().map(|e| e.outcome).collect()
    }

    pub fn count(&self, outcome: RequestOutcome) -> usize {
        self.events()
            .iter()
            .filter(|e| e.outcome == outcome)
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObserver {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl RequestObserver for InMemoryObserver {
    fn observe(&self, event: &RequestEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event.clone());
            if events.len() > self.max_events {
                events.remove(0);
            }
        }
    }
}
