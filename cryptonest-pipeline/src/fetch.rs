//! Bounded-concurrency fetch stage.
//!
//! Each call runs one source's entities on a dedicated rayon pool sized to
//! the provider's `max_in_flight`, so no provider ever sees more concurrent
//! requests than configured. Different providers run on different pools and
//! do not throttle each other.

use crate::error::PipelineError;
use crate::progress::FetchProgress;
use cryptonest_core::cache::{CacheError, Lookup, StoreError, StoreOp};
use cryptonest_core::domain::{DateRange, EntityId};
use cryptonest_core::source::{CachedFetcher, Source, SourceFetcher};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Outcome of one fetch stage.
#[derive(Debug)]
pub struct FetchReport<P> {
    pub source: Source,
    pub payloads: BTreeMap<EntityId, P>,
    pub failures: Vec<(EntityId, CacheError)>,
    pub hits: usize,
    pub misses: usize,
}

impl<P> FetchReport<P> {
    pub fn total(&self) -> usize {
        self.payloads.len() + self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fetch every entity through the cache with at most `max_in_flight`
/// concurrent fetches.
///
/// Provider failures are collected per entity and the stage carries on. A
/// store failure that the cache policy did not absorb aborts the stage. Once
/// the provider's circuit breaker opens, cached entities are still served and
/// uncached ones fail without a request.
pub fn fetch_all<F: SourceFetcher>(
    fetcher: &CachedFetcher<F>,
    entities: &[EntityId],
    range: &DateRange,
    max_in_flight: usize,
    progress: &dyn FetchProgress,
) -> Result<FetchReport<F::Payload>, PipelineError> {
    let source = fetcher.source();
    let total = entities.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_in_flight.max(1))
        .thread_name(move |i| format!("fetch-{source}-{i}"))
        .build()
        .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;
    let aborted = AtomicBool::new(false);

    let results: Vec<(EntityId, Result<(F::Payload, Lookup), CacheError>)> = pool.install(|| {
        entities
            .par_iter()
            .enumerate()
            .map(|(index, entity)| {
                if aborted.load(Ordering::Relaxed) {
                    let err = CacheError::Store {
                        key: fetcher.key(entity, range).to_string(),
                        op: StoreOp::Read,
                        source: StoreError::Unavailable {
                            store: fetcher.cache().store_name().to_string(),
                            reason: "stage aborted after an earlier store failure".into(),
                        },
                    };
                    return (entity.clone(), Err(err));
                }
                progress.on_start(source, entity, index, total);
                let result = fetcher.fetch_traced(entity, range);
                if matches!(&result, Err(e) if e.is_store_failure()) {
                    aborted.store(true, Ordering::Relaxed);
                }
                let status = result.as_ref().map(|(_, lookup)| *lookup);
                progress.on_complete(source, entity, index, total, status);
                (entity.clone(), result)
            })
            .collect()
    });

    let mut report = FetchReport {
        source,
        payloads: BTreeMap::new(),
        failures: Vec::new(),
        hits: 0,
        misses: 0,
    };
    let mut store_failure = None;
    for (entity, result) in results {
        match result {
            Ok((payload, lookup)) => {
                match lookup {
                    Lookup::Hit => report.hits += 1,
                    Lookup::Miss => report.misses += 1,
                }
                report.payloads.insert(entity, payload);
            }
            Err(e) if e.is_store_failure() => {
                if store_failure.is_none() {
                    store_failure = Some(e);
                }
            }
            Err(e) => report.failures.push((entity, e)),
        }
    }
    if let Some(e) = store_failure {
        return Err(e.into());
    }

    progress.on_batch_complete(source, report.payloads.len(), report.failures.len(), total);
    if !report.failures.is_empty() {
        warn!(
            %source,
            failed = report.failures.len(),
            total,
            "some entities could not be fetched"
        );
    }
    Ok(report)
}
