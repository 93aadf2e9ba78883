//! The key/value capability the cache manager is written against.
//!
//! Stores move opaque bytes. They know nothing about entries, payload types or
//! hit/miss accounting, which lets the manager run unchanged over a remote
//! bucket, a local directory, both, or an in-memory fake.

use super::key::CacheKey;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or overloaded. Worth retrying.
    #[error("{store}: unavailable: {reason}")]
    Unavailable { store: String, reason: String },

    /// Backend refused the operation (auth, quota, bad request). Not retried.
    #[error("{store}: rejected: {reason}")]
    Rejected { store: String, reason: String },

    #[error("{store}: I/O error: {source}")]
    Io {
        store: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Key/value object store shared across pipelines and processes.
///
/// Implementations must make a completed `put` visible to any later `get` of
/// the same key. Concurrent `put`s of one key may race; the store must end up
/// holding one of the written payloads intact.
pub trait CacheStore: Send + Sync {
    /// Human-readable store name for diagnostics.
    fn name(&self) -> &str;

    fn exists(&self, key: &CacheKey) -> Result<bool, StoreError>;

    /// `Ok(None)` when the key is absent.
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &CacheKey, payload: &[u8]) -> Result<(), StoreError>;
}

impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        (**self).exists(key)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &CacheKey, payload: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, payload)
    }
}
