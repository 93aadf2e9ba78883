//! Per-entity progress reporting for fetch stages.

use cryptonest_core::cache::{CacheError, Lookup};
use cryptonest_core::source::Source;
use tracing::{debug, info, warn};

/// Called from fetch workers, possibly concurrently.
pub trait FetchProgress: Send + Sync {
    /// Called when starting to fetch an entity.
    fn on_start(&self, source: Source, entity: &str, index: usize, total: usize);

    /// Called when an entity's fetch completes.
    fn on_complete(
        &self,
        source: Source,
        entity: &str,
        index: usize,
        total: usize,
        result: Result<Lookup, &CacheError>,
    );

    /// Called when the whole batch for one source is done.
    fn on_batch_complete(&self, source: Source, succeeded: usize, failed: usize, total: usize);
}

/// Reports through `tracing` events.
pub struct TracingProgress;

impl FetchProgress for TracingProgress {
    fn on_start(&self, source: Source, entity: &str, index: usize, total: usize) {
        debug!(%source, entity, "[{}/{}] fetching", index + 1, total);
    }

    fn on_complete(
        &self,
        source: Source,
        entity: &str,
        _index: usize,
        _total: usize,
        result: Result<Lookup, &CacheError>,
    ) {
        match result {
            Ok(lookup) => debug!(%source, entity, ?lookup, "ok"),
            Err(e) => warn!(%source, entity, error = %e, "fetch failed"),
        }
    }

    fn on_batch_complete(&self, source: Source, succeeded: usize, failed: usize, total: usize) {
        info!(%source, succeeded, failed, total, "fetch stage complete");
    }
}

/// Discards all progress events.
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_start(&self, _: Source, _: &str, _: usize, _: usize) {}

    fn on_complete(&self, _: Source, _: &str, _: usize, _: usize, _: Result<Lookup, &CacheError>) {}

    fn on_batch_complete(&self, _: Source, _: usize, _: usize, _: usize) {}
}
