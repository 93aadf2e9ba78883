//! Get-or-fetch over a [`CacheStore`].
//!
//! Protocol per key:
//! - hit: decode and return the stored payload; the fetch closure is never run
//! - miss: run the fetch; on success write exactly one entry, then return the
//!   payload decoded from the encoded bytes, the same decode path a later hit
//!   takes; on failure write nothing
//!
//! Store failures are reported separately from fetch failures. The
//! [`StoreFailurePolicy`] chosen by the caller decides whether they abort the
//! request or degrade to a live fetch.

use super::entry::CacheEntry;
use super::key::CacheKey;
use super::retry::RetryPolicy;
use super::store::{CacheStore, StoreError};
use crate::source::ProviderError;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Which store operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Read,
    Write,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOp::Read => f.write_str("read"),
            StoreOp::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache {op} failed for '{key}': {source}")]
    Store {
        key: String,
        op: StoreOp,
        #[source]
        source: StoreError,
    },

    #[error("fetch failed for '{key}': {source}")]
    Fetch {
        key: String,
        #[source]
        source: ProviderError,
    },

    #[error("corrupt cache entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

impl CacheError {
    pub fn key(&self) -> &str {
        match self {
            CacheError::Store { key, .. }
            | CacheError::Fetch { key, .. }
            | CacheError::Corrupt { key, .. } => key,
        }
    }

    pub fn is_store_failure(&self) -> bool {
        matches!(self, CacheError::Store { .. })
    }

    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            CacheError::Fetch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// What to do when the store itself fails after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Surface the store error to the caller.
    #[default]
    Abort,
    /// Treat an unreadable store as a miss and an unwritable store as a
    /// successful fetch that simply isn't cached.
    FetchLive,
}

/// Whether a request was served from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    fetch_failures: AtomicU64,
    store_failures: AtomicU64,
}

/// Point-in-time copy of the manager's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub fetch_failures: u64,
    pub store_failures: u64,
}

/// Owns the hit/miss/save protocol. The only writer to its store.
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    retry: RetryPolicy,
    on_store_error: StoreFailurePolicy,
    counters: Counters,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            on_store_error: StoreFailurePolicy::Abort,
            counters: Counters::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_store_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.on_store_error = policy;
        self
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            fetch_failures: self.counters.fetch_failures.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
        }
    }

    /// Whether an entry exists under `key`.
    pub fn contains(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.with_retries(key, StoreOp::Read, || self.store.exists(key))
    }

    /// Return the cached payload under `key`, or fetch, store and return it.
    pub fn fetch_or_load<T, F>(&self, key: &CacheKey, fetch: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, ProviderError>,
    {
        self.fetch_or_load_traced(key, fetch).map(|(v, _)| v)
    }

    /// Like [`fetch_or_load`](Self::fetch_or_load), also reporting hit or miss.
    pub fn fetch_or_load_traced<T, F>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> Result<(T, Lookup), CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, ProviderError>,
    {
        match self.read_entry(key) {
            Ok(Some(entry)) => match entry.payload::<T>() {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(%key, "cache hit");
                    return Ok((value, Lookup::Hit));
                }
                Err(reason) => {
                    warn!(%key, %reason, "cached payload does not decode, refetching");
                }
            },
            Ok(None) => {}
            Err(CacheError::Corrupt { reason, .. }) => {
                warn!(%key, %reason, "corrupt cache entry, refetching");
            }
            Err(e) if self.on_store_error == StoreFailurePolicy::FetchLive => {
                warn!(%key, error = %e, "cache read failed, fetching live");
            }
            Err(e) => return Err(e),
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        info!(%key, "cache miss, fetching live");
        let value = self.fetch_and_store(key, fetch)?;
        Ok((value, Lookup::Miss))
    }

    /// Fetch unconditionally and overwrite whatever is stored under `key`.
    pub fn refetch<T, F>(&self, key: &CacheKey, fetch: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, ProviderError>,
    {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        info!(%key, "explicit refetch");
        self.fetch_and_store(key, fetch)
    }

    /// Read a payload without fetching. `Ok(None)` on a miss.
    pub fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        match self.read_entry(key)? {
            None => Ok(None),
            Some(entry) => entry
                .payload()
                .map(Some)
                .map_err(|reason| CacheError::Corrupt {
                    key: key.to_string(),
                    reason,
                }),
        }
    }

    fn read_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = self.with_retries(key, StoreOp::Read, || self.store.get(key))?;
        match bytes {
            None => Ok(None),
            Some(bytes) => CacheEntry::decode(key, &bytes)
                .map(Some)
                .map_err(|reason| CacheError::Corrupt {
                    key: key.to_string(),
                    reason,
                }),
        }
    }

    fn fetch_and_store<T, F>(&self, key: &CacheKey, fetch: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, ProviderError>,
    {
        let fetched = fetch().map_err(|source| {
            self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
            CacheError::Fetch {
                key: key.to_string(),
                source,
            }
        })?;

        let corrupt = |reason: String| CacheError::Corrupt {
            key: key.to_string(),
            reason,
        };
        let bytes = CacheEntry::new(key, Utc::now(), &fetched)
            .and_then(|entry| entry.encode())
            .map_err(corrupt)?;
        let value: T = CacheEntry::decode(key, &bytes)
            .and_then(|entry| entry.payload())
            .map_err(corrupt)?;

        match self.with_retries(key, StoreOp::Write, || self.store.put(key, &bytes)) {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                info!(%key, bytes = bytes.len(), "saved to cache");
                Ok(value)
            }
            Err(e) if self.on_store_error == StoreFailurePolicy::FetchLive => {
                warn!(%key, error = %e, "cache write failed, returning uncached payload");
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    fn with_retries<T>(
        &self,
        key: &CacheKey,
        op: StoreOp,
        f: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, CacheError> {
        self.retry
            .run(key.as_str(), f, StoreError::is_transient, |_| None)
            .map_err(|source| {
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                CacheError::Store {
                    key: key.to_string(),
                    op,
                    source,
                }
            })
    }
}
