//! 幂等初始化器：同一 key 的异步操作至多并发执行一次。
//!
//! Idempotent async initializer.
//!
//! Wraps an async operation so that, per key, it runs at most once at a time
//! and at most once overall unless the caller explicitly asks for a retry.
//! Bootstrap flows (claiming an invite, loading the current task) use it so
//! that duplicate triggers never produce duplicate claims or fetches.
//!
//! ```rust
//! use simrun_core::initializer::{Disposition, Initializer};
//!
//! # async fn demo() -> simrun_core::Result<()> {
//! let init = Initializer::new(|invite: String| async move {
//!     println!("claiming {invite}");
//!     Ok(())
//! });
//! assert_eq!(init.run("abc".to_string(), false).await?, Disposition::Executed);
//! assert_eq!(init.run("abc".to_string(), false).await?, Disposition::AlreadyDone);
//! assert_eq!(init.run("abc".to_string(), true).await?, Disposition::Executed);
//! # Ok(())
//! # }
//! ```

use crate::Result;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// What a call to [`Initializer::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The operation ran (its error, if any, is returned alongside).
    Executed,
    /// Skipped: a run for this key is still in flight.
    InFlight,
    /// Skipped: this key already completed.
    AlreadyDone,
}

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    in_flight: bool,
    done: bool,
    generation: u64,
}

type Operation<K> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub struct Initializer<K> {
    op: Operation<K>,
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Initializer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new<F, Fut>(op: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            op: Arc::new(move |key| op(key).boxed()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Run the operation for `key` unless it is in flight or already done.
    ///
    /// With `allow_retry` the key is reset and the operation always runs; a
    /// superseded run still finishes but no longer updates the key's state.
    /// Both success and failure mark the key done.
    pub async fn run(&self, key: K, allow_retry: bool) -> Result<Disposition> {
        let generation = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(key.clone()).or_default();
            if !allow_retry {
                if slot.in_flight {
                    debug!(key = ?key, "initializer skipped: in flight");
                    return Ok(Disposition::InFlight);
                }
                if slot.done {
                    debug!(key = ?key, "initializer skipped: already done");
                    return Ok(Disposition::AlreadyDone);
                }
            }
            slot.generation += 1;
            slot.in_flight = true;
            slot.done = false;
            slot.generation
        };

        let mut guard = SettleGuard {
            slots: &self.slots,
            key: key.clone(),
            generation,
            completed: false,
        };
        let result = (self.op)(key).await;
        guard.completed = true;
        drop(guard);

        result.map(|_| Disposition::Executed)
    }

    /// Forget the key so the next `run` executes again.
    pub fn reset(&self, key: &K) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    pub fn is_done(&self, key: &K) -> bool {
        self.slot(key).map(|s| s.done).unwrap_or(false)
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.slot(key).map(|s| s.in_flight).unwrap_or(false)
    }

    fn slot(&self, key: &K) -> Option<Slot> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }
}

/// Clears the in-flight flag however the run ends. A run whose future is
/// dropped before completion is not marked done.
struct SettleGuard<'a, K: Eq + Hash> {
    slots: &'a Mutex<HashMap<K, Slot>>,
    key: K,
    generation: u64,
    completed: bool,
}

impl<K: Eq + Hash> Drop for SettleGuard<'_, K> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(&self.key) {
            if slot.generation == self.generation {
                slot.in_flight = false;
                slot.done = self.completed;
            }
        }
    }
}
