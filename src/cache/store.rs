//! In-memory TTL store for successful responses.

use super::key::RequestKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound applied to every TTL, whatever the caller asks for.
pub const MAX_CACHE_TTL: Duration = Duration::from_millis(15_000);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Short-lived response cache owned by one request client.
///
/// Expired entries are never returned; they are dropped on the read that
/// discovers them and swept on insert.
pub struct ResponseCache {
    entries: Mutex<HashMap<RequestKey, CacheEntry>>,
    max_entries: usize,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            stats: AtomicStats::default(),
        }
    }

    pub fn get(&self, key: &RequestKey) -> Option<serde_json::Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether a live entry exists for `key`. Does not touch hit/miss stats.
    pub fn contains(&self, key: &RequestKey) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    /// Store `value` for `min(ttl, MAX_CACHE_TTL)`. A zero TTL stores nothing.
    pub fn insert(&self, key: RequestKey, value: serde_json::Value, ttl: Duration) {
        let ttl = ttl.min(MAX_CACHE_TTL);
        if ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, e| !e.is_expired(now));
        while entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalidate(&self, key: &RequestKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some()
    }

    /// Drop every entry whose URL starts with `prefix` (e.g. after a mutation).
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|k, _| !k.url.starts_with(prefix));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use serde_json::json;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        let url = Url::parse("https://api.example.com").unwrap().join(path).unwrap();
        RequestKey::new(&Method::GET, &url, true, None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_contains_ignores_stats_and_expiry() {
        let cache = ResponseCache::new(8);
        assert!(!cache.contains(&key("/a")));
        cache.insert(key("/a"), json!(1), Duration::from_millis(500));
        assert!(cache.contains(&key("/a")));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!cache.contains(&key("/a")));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = ResponseCache::new(8);
        cache.insert(key("/a"), json!({"ok": true}), Duration::from_millis(500));
        assert_eq!(cache.get(&key("/a")), Some(json!({"ok": true})));

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(cache.get(&key("/a")).is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(&key("/a")).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_is_capped() {
        let cache = ResponseCache::new(8);
        cache.insert(key("/a"), json!(1), Duration::from_secs(600));
        tokio::time::advance(MAX_CACHE_TTL).await;
        assert!(cache.get(&key("/a")).is_none());
    }

    #[test]
    fn test_zero_ttl_stores_nothing() {
        let cache = ResponseCache::new(8);
        cache.insert(key("/a"), json!(1), Duration::ZERO);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().sets, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_soonest_expiry_when_full() {
        let cache = ResponseCache::new(2);
        cache.insert(key("/a"), json!("a"), Duration::from_secs(1));
        cache.insert(key("/b"), json!("b"), Duration::from_secs(5));
        cache.insert(key("/c"), json!("c"), Duration::from_secs(5));
        assert!(cache.get(&key("/a")).is_none());
        assert!(cache.get(&key("/b")).is_some());
        assert!(cache.get(&key("/c")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let cache = ResponseCache::new(8);
        cache.insert(key("/api/tasks/1"), json!(1), Duration::from_secs(5));
        cache.insert(key("/api/tasks/2"), json!(2), Duration::from_secs(5));
        cache.insert(key("/api/invites"), json!(3), Duration::from_secs(5));
        let removed = cache.invalidate_prefix("https://api.example.com/api/tasks");
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_hit_ratio() {
        let cache = ResponseCache::new(8);
        cache.insert(key("/a"), json!(1), Duration::from_secs(5));
        cache.get(&key("/a"));
        cache.get(&key("/b"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
