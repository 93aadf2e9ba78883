//! A `SourceFetcher` routed through the shared cache.

use super::provider::{ProviderError, Source, SourceFetcher};
use crate::cache::{CacheError, CacheKey, CacheManager, Lookup};
use crate::domain::DateRange;
use std::sync::Arc;

/// Wraps a fetcher so every call goes through [`CacheManager::fetch_or_load`].
///
/// The key is built from the source id, the entity and the date range plus
/// whatever the fetcher reports in [`SourceFetcher::key_params`].
///
/// Cached entries are served even while the provider refuses requests; only
/// a miss consults [`SourceFetcher::is_available`].
pub struct CachedFetcher<F> {
    fetcher: F,
    cache: Arc<CacheManager>,
}

impl<F: SourceFetcher> CachedFetcher<F> {
    pub fn new(fetcher: F, cache: Arc<CacheManager>) -> Self {
        Self { fetcher, cache }
    }

    pub fn source(&self) -> Source {
        self.fetcher.source()
    }

    pub fn inner(&self) -> &F {
        &self.fetcher
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn key(&self, entity: &str, range: &DateRange) -> CacheKey {
        CacheKey::builder(self.fetcher.source().as_str(), entity)
            .range(range)
            .params(self.fetcher.key_params(entity))
            .build()
    }

    pub fn fetch(&self, entity: &str, range: &DateRange) -> Result<F::Payload, CacheError> {
        self.fetch_traced(entity, range).map(|(payload, _)| payload)
    }

    pub fn fetch_traced(
        &self,
        entity: &str,
        range: &DateRange,
    ) -> Result<(F::Payload, Lookup), CacheError> {
        let key = self.key(entity, range);
        self.cache
            .fetch_or_load_traced(&key, || self.live_fetch(entity, range))
    }

    /// Bypass the cached entry and overwrite it with a live fetch.
    pub fn refetch(&self, entity: &str, range: &DateRange) -> Result<F::Payload, CacheError> {
        let key = self.key(entity, range);
        self.cache.refetch(&key, || self.live_fetch(entity, range))
    }

    fn live_fetch(&self, entity: &str, range: &DateRange) -> Result<F::Payload, ProviderError> {
        if !self.fetcher.is_available() {
            return Err(ProviderError::CircuitBreakerTripped {
                provider: self.fetcher.source().provider().into(),
            });
        }
        self.fetcher.fetch(entity, range)
    }
}
