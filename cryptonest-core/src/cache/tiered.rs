//! Two-level store: a local directory in front of a shared remote store.
//!
//! Reads try local first, then remote; a remote hit is copied down so the next
//! read in this process (or any later run on this machine) stays local. Writes
//! go to the remote first so a payload is never only cached privately.

use super::key::CacheKey;
use super::store::{CacheStore, StoreError};
use tracing::{debug, warn};

pub struct TieredStore<L, R> {
    local: L,
    remote: R,
}

impl<L: CacheStore, R: CacheStore> TieredStore<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }
}

impl<L: CacheStore, R: CacheStore> CacheStore for TieredStore<L, R> {
    fn name(&self) -> &str {
        "tiered"
    }

    fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        match self.local.exists(key) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => warn!(store = self.local.name(), %key, error = %e, "local exists check failed"),
        }
        self.remote.exists(key)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError> {
        match self.local.get(key) {
            Ok(Some(bytes)) => return Ok(Some(bytes)),
            Ok(None) => {}
            Err(e) => warn!(store = self.local.name(), %key, error = %e, "local read failed"),
        }

        let remote = self.remote.get(key)?;
        if let Some(bytes) = &remote {
            debug!(%key, "remote hit, copying to local tier");
            if let Err(e) = self.local.put(key, bytes) {
                warn!(store = self.local.name(), %key, error = %e, "local write-through failed");
            }
        }
        Ok(remote)
    }

    fn put(&self, key: &CacheKey, payload: &[u8]) -> Result<(), StoreError> {
        self.remote.put(key, payload)?;
        if let Err(e) = self.local.put(key, payload) {
            warn!(store = self.local.name(), %key, error = %e, "local write failed");
        }
        Ok(())
    }
}
