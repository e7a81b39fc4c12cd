//! In-flight registry: one shared call per request key.

use crate::cache::RequestKey;
use crate::Result;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Output of one network call: HTTP status and decoded body.
pub(crate) type CallOutput = Result<(u16, serde_json::Value)>;
pub(crate) type SharedCall = Shared<BoxFuture<'static, CallOutput>>;

/// The registry only keeps weak handles. When every waiter has gone away the
/// call future is dropped, which cancels the transport request and removes
/// the entry through [`RemoveOnDrop`].
pub(crate) struct InflightRegistry {
    calls: Mutex<HashMap<RequestKey, (u64, WeakShared<BoxFuture<'static, CallOutput>>)>>,
    next_id: AtomicU64,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Join the call registered for `key`, or register the one produced by `start`.
    ///
    /// Returns the shared call and `true` when an existing call was joined.
    pub fn join_or_start(
        self: &Arc<Self>,
        key: RequestKey,
        start: impl FnOnce() -> BoxFuture<'static, CallOutput>,
    ) -> (SharedCall, bool) {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, weak)) = calls.get(&key) {
            if let Some(call) = weak.upgrade() {
                return (call, true);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = RemoveOnDrop {
            registry: Arc::downgrade(self),
            key: key.clone(),
            id,
        };
        let fut = start();
        let call = async move {
            let _guard = guard;
            fut.await
        }
        .boxed()
        .shared();
        if let Some(weak) = call.downgrade() {
            calls.insert(key, (id, weak));
        }
        (call, false)
    }

    fn remove(&self, key: &RequestKey, id: u64) {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        if calls.get(key).map(|(current, _)| *current == id).unwrap_or(false) {
            calls.remove(key);
        }
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Clears the registry slot when the call settles or is abandoned.
struct RemoveOnDrop {
    registry: Weak<InflightRegistry>,
    key: RequestKey,
    id: u64,
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    fn key() -> RequestKey {
        RequestKey::new(
            &Method::GET,
            &Url::parse("https://api.example.com/a").unwrap(),
            false,
            None,
        )
    }

    #[tokio::test]
    async fn test_second_caller_joins() {
        let registry = Arc::new(InflightRegistry::new());
        let starts = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let s = starts.clone();
        let (first, joined_first) = registry.join_or_start(key(), move || {
            s.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = rx.await;
                Ok((200, json!("done")))
            }
            .boxed()
        });
        let s = starts.clone();
        let (second, joined_second) = registry.join_or_start(key(), move || {
            s.fetch_add(1, Ordering::SeqCst);
            async { Ok((200, json!("other"))) }.boxed()
        });

        assert!(!joined_first);
        assert!(joined_second);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(registry.contains(&key()));

        tx.send(()).unwrap();
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap().1, json!("done"));
        assert_eq!(b.unwrap().1, json!("done"));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_failure_clears_entry() {
        let registry = Arc::new(InflightRegistry::new());
        let (call, _) = registry.join_or_start(key(), || {
            async { Err(Error::network("connection refused")) }.boxed()
        });
        assert!(call.await.is_err());
        assert!(!registry.contains(&key()));
    }

    #[tokio::test]
    async fn test_abandoned_call_clears_entry() {
        let registry = Arc::new(InflightRegistry::new());
        let (call, _) = registry.join_or_start(key(), || {
            futures::future::pending::<CallOutput>().boxed()
        });
        assert!(registry.contains(&key()));
        drop(call);
        assert!(!registry.contains(&key()));
    }
}
