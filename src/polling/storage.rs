//! Key/value store used to persist the active run id.

use crate::{Error, ErrorContext, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Session-scoped string store. A missing key is a normal state.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-lifetime store. Share one instance (via `Arc`) between engine
/// instances to let a new instance pick up a run left by an earlier one.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned(op: &str) -> Error {
        Error::storage_with_context(
            "store lock poisoned",
            ErrorContext::new()
                .with_details(op.to_string())
                .with_source("memory_store"),
        )
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned("get"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned("set"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned("remove"))?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_absence() {
        let store = MemoryStore::new();
        assert_eq!(store.get("simrun:test-run:1").unwrap(), None);
        store.set("simrun:test-run:1", "run-9").unwrap();
        assert_eq!(store.get("simrun:test-run:1").unwrap().as_deref(), Some("run-9"));
        store.set("simrun:test-run:1", "run-10").unwrap();
        assert_eq!(store.get("simrun:test-run:1").unwrap().as_deref(), Some("run-10"));
        store.remove("simrun:test-run:1").unwrap();
        store.remove("simrun:test-run:1").unwrap();
        assert!(store.is_empty());
    }
}
