//! In-memory store for tests and offline runs.
//!
//! Counts operations and can inject failures so the manager's hit/miss and
//! failure paths are testable without a network.

use super::key::CacheKey;
use super::store::{CacheStore, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    transient_failures: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored bytes for `key`, bypassing counters and failure injection.
    pub fn raw(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.entries
            .read()
            .ok()
            .and_then(|m| m.get(key.as_str()).cloned())
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Make every read fail with a permanent error.
    pub fn set_read_failure(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail with a permanent error.
    pub fn set_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` operations (any kind) with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    fn take_transient(&self) -> Result<(), StoreError> {
        let took = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(StoreError::Unavailable {
                store: self.name().into(),
                reason: "injected transient failure".into(),
            })
        } else {
            Ok(())
        }
    }

    fn poisoned(&self) -> StoreError {
        StoreError::Unavailable {
            store: self.name().into(),
            reason: "lock poisoned".into(),
        }
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        self.take_transient()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                store: self.name().into(),
                reason: "reads disabled".into(),
            });
        }
        let map = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(map.contains_key(key.as_str()))
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.take_transient()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                store: self.name().into(),
                reason: "reads disabled".into(),
            });
        }
        let map = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(map.get(key.as_str()).cloned())
    }

    fn put(&self, key: &CacheKey, payload: &[u8]) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.take_transient()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                store: self.name().into(),
                reason: "writes disabled".into(),
            });
        }
        let mut map = self.entries.write().map_err(|_| self.poisoned())?;
        map.insert(key.as_str().to_string(), payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let store = MemoryStore::new();
        let key = CacheKey::named("maps", "chains");
        assert_eq!(store.get(&key).unwrap(), None);
        store.put(&key, b"abc").unwrap();
        assert!(store.exists(&key).unwrap());
        assert_eq!(store.get(&key).unwrap().as_deref(), Some(&b"abc"[..]));
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.get_count(), 2);
    }

    #[test]
    fn transient_failures_run_out() {
        let store = MemoryStore::new();
        let key = CacheKey::named("maps", "chains");
        store.fail_next(2);
        assert!(store.get(&key).unwrap_err().is_transient());
        assert!(store.get(&key).unwrap_err().is_transient());
        assert!(store.get(&key).is_ok());
    }

    #[test]
    fn permanent_write_failure() {
        let store = MemoryStore::new();
        store.set_write_failure(true);
        let err = store.put(&CacheKey::named("a", "b"), b"x").unwrap_err();
        assert!(!err.is_transient());
        assert!(store.is_empty());
    }
}
