use super::backoff::BackoffPolicy;
use crate::{Error, ErrorContext, Result};
use std::env;
use std::time::Duration;

/// Limits and persistence settings for one polling engine.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub backoff: BackoffPolicy,
    /// Poll calls allowed per run, throwing calls included.
    pub max_attempts: u32,
    /// Wall-clock budget measured from the start of the run.
    pub max_duration: Duration,
    /// Key under which the active run id is persisted.
    pub storage_key: String,
}

impl PollerConfig {
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_attempts: 80,
            max_duration: Duration::from_secs(15 * 60),
            storage_key: storage_key.into(),
        }
    }

    /// Defaults overridden by env:
    /// - `SIMRUN_POLL_BASE_MS` / `SIMRUN_POLL_MAX_MS` / `SIMRUN_POLL_FACTOR`
    /// - `SIMRUN_POLL_MAX_ATTEMPTS`
    /// - `SIMRUN_POLL_MAX_DURATION_SECS`
    pub fn from_env(storage_key: impl Into<String>) -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
        }

        let mut cfg = Self::new(storage_key);
        let base = var::<u64>("SIMRUN_POLL_BASE_MS")
            .map(Duration::from_millis)
            .unwrap_or(cfg.backoff.base);
        let max = var::<u64>("SIMRUN_POLL_MAX_MS")
            .map(Duration::from_millis)
            .unwrap_or(cfg.backoff.max);
        let factor = var::<f64>("SIMRUN_POLL_FACTOR").unwrap_or(1.5);
        cfg.backoff = BackoffPolicy::exponential(base, max.max(base), factor);
        if let Some(n) = var::<u32>("SIMRUN_POLL_MAX_ATTEMPTS") {
            cfg.max_attempts = n.max(1);
        }
        if let Some(secs) = var::<u64>("SIMRUN_POLL_MAX_DURATION_SECS") {
            cfg.max_duration = Duration::from_secs(secs.max(1));
        }
        cfg
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_max_duration(mut self, d: Duration) -> Self {
        self.max_duration = d;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "storage key must not be empty",
                ErrorContext::new()
                    .with_field_path("poller.storage_key")
                    .with_source("poller_config"),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::configuration_with_context(
                "max_attempts must be at least 1",
                ErrorContext::new()
                    .with_field_path("poller.max_attempts")
                    .with_source("poller_config"),
            ));
        }
        if self.backoff.max < self.backoff.base {
            return Err(Error::configuration_with_context(
                "maximum poll interval is below the base interval",
                ErrorContext::new()
                    .with_field_path("poller.backoff.max")
                    .with_details(format!(
                        "base={}ms max={}ms",
                        self.backoff.base.as_millis(),
                        self.backoff.max.as_millis()
                    ))
                    .with_source("poller_config"),
            ));
        }
        Ok(())
    }
}
