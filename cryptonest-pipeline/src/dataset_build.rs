//! Dataset assembly: fetch every universe member from all three sources,
//! keep each entity's rows for its membership months, merge and write.

use crate::error::PipelineError;
use crate::fetch::{fetch_all, FetchReport};
use crate::progress::FetchProgress;
use chrono::NaiveDate;
use cryptonest_core::cache::{CacheError, CacheKey, CacheManager};
use cryptonest_core::dataset::write_parquet;
use cryptonest_core::domain::{month_start, DateRange, EntityId};
use cryptonest_core::merge::{merge, IdentityCollision, IdentityTable, MergedRecord, RecordsBySource};
use cryptonest_core::source::{
    CachedFetcher, DefiLlamaClient, LlamaMaps, MarketPayload, OnChainPayload, SocialPayload,
    SourceFetcher,
};
use cryptonest_core::universe::UniverseSnapshot;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// The three cached fetchers a dataset build draws from.
pub struct Sources<M, O, S> {
    pub market: CachedFetcher<M>,
    pub on_chain: CachedFetcher<O>,
    pub social: CachedFetcher<S>,
}

/// Per-provider concurrency limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concurrency {
    pub market: usize,
    pub on_chain: usize,
    pub social: usize,
}

#[derive(Debug)]
pub struct DatasetBuild {
    /// Sorted by (canonical id, date).
    pub records: Vec<MergedRecord>,
    pub collisions: Vec<IdentityCollision>,
    pub market: FetchReport<MarketPayload>,
    pub on_chain: FetchReport<OnChainPayload>,
    pub social: FetchReport<SocialPayload>,
}

impl DatasetBuild {
    pub fn canonical_entities(&self) -> usize {
        let mut ids: Vec<&str> = self.records.iter().map(|r| r.canonical_id.as_str()).collect();
        ids.dedup();
        ids.len()
    }

    pub fn write(&self, path: &Path) -> Result<usize, PipelineError> {
        let rows = write_parquet(&self.records, path)?;
        info!(rows, entities = self.canonical_entities(), path = %path.display(), "dataset written");
        Ok(rows)
    }
}

/// DeFiLlama id maps, cached like any other fetch.
pub fn load_llama_maps(client: &DefiLlamaClient, cache: &CacheManager) -> Result<LlamaMaps, CacheError> {
    let protocols = cache.fetch_or_load(&CacheKey::named("maps", "llama_protocol_map"), || {
        client.fetch_protocol_map()
    })?;
    let chains = cache.fetch_or_load(&CacheKey::named("maps", "llama_chain_map"), || {
        client.fetch_chain_map()
    })?;
    Ok(LlamaMaps { protocols, chains })
}

/// Drop rows dated before `start` or outside the entity's membership months.
pub fn point_in_time_filter(records: &mut RecordsBySource, snapshot: &UniverseSnapshot, start: NaiveDate) {
    let membership = snapshot.membership();
    records.retain(|entity, date| {
        date >= start
            && membership
                .get(entity)
                .is_some_and(|months| months.contains(&month_start(date)))
    });
}

/// Fetch all sources for every snapshot member over `range`, then filter and
/// merge.
///
/// The three providers are fetched concurrently, each on its own bounded
/// pool. An entity missing from the market source has no rows; an entity
/// missing from on-chain or social has those attributes absent.
pub fn assemble_dataset<M, O, S>(
    snapshot: &UniverseSnapshot,
    sources: &Sources<M, O, S>,
    tickers: &BTreeMap<EntityId, String>,
    identities: &IdentityTable,
    range: &DateRange,
    limits: Concurrency,
    progress: &dyn FetchProgress,
) -> Result<DatasetBuild, PipelineError>
where
    M: SourceFetcher<Payload = MarketPayload>,
    O: SourceFetcher<Payload = OnChainPayload>,
    S: SourceFetcher<Payload = SocialPayload>,
{
    let entities: Vec<EntityId> = snapshot.unique_entities().into_iter().collect();
    info!(
        entities = entities.len(),
        months = snapshot.len(),
        range = %range,
        "assembling dataset"
    );
    for entity in entities.iter().filter(|e| identities.is_alias(e)) {
        info!(
            entity = entity.as_str(),
            canonical = identities.canonical(entity),
            "universe member folds into its canonical asset"
        );
    }

    let (market, (on_chain, social)) = rayon::join(
        || fetch_all(&sources.market, &entities, range, limits.market, progress),
        || {
            rayon::join(
                || fetch_all(&sources.on_chain, &entities, range, limits.on_chain, progress),
                || fetch_all(&sources.social, &entities, range, limits.social, progress),
            )
        },
    );
    let (market, on_chain, social) = (market?, on_chain?, social?);

    let mut records = RecordsBySource::default();
    for (entity, payload) in &market.payloads {
        let ticker = tickers.get(entity).map(String::as_str);
        records.market.extend(payload.to_records(entity, ticker));
    }
    for (entity, payload) in &on_chain.payloads {
        records.on_chain.extend(payload.to_records(entity));
    }
    for (entity, payload) in &social.payloads {
        records.social.extend(payload.to_records(entity));
    }
    for (entity, _) in &market.failures {
        warn!(entity = entity.as_str(), "no market data, entity left out of dataset");
    }

    point_in_time_filter(&mut records, snapshot, range.start);
    let merged = merge(&records, identities);
    info!(
        rows = merged.records.len(),
        collisions = merged.collisions.len(),
        "merged dataset"
    );

    Ok(DatasetBuild {
        records: merged.records,
        collisions: merged.collisions,
        market,
        on_chain,
        social,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptonest_core::merge::MarketRecord;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(entity: &str, date: &str) -> MarketRecord {
        MarketRecord {
            date: d(date),
            entity: entity.into(),
            ticker: None,
            open: None,
            high: None,
            low: None,
            close: Some(1.0),
            volume: None,
            market_cap: None,
        }
    }

    #[test]
    fn filter_keeps_membership_months_only() {
        let mut snapshot = UniverseSnapshot::new();
        snapshot.insert(d("2022-01-01"), vec!["a".into()]).unwrap();
        snapshot.insert(d("2022-02-01"), vec!["b".into()]).unwrap();
        snapshot.insert(d("2022-03-01"), vec!["a".into(), "b".into()]).unwrap();

        let mut records = RecordsBySource {
            market: vec![
                row("a", "2021-12-31"),
                row("a", "2022-01-15"),
                row("a", "2022-02-15"),
                row("a", "2022-03-01"),
                row("b", "2022-01-31"),
                row("b", "2022-02-01"),
                row("c", "2022-03-01"),
            ],
            ..Default::default()
        };
        point_in_time_filter(&mut records, &snapshot, d("2022-01-01"));
        let kept: Vec<(&str, NaiveDate)> = records.market.iter().map(|r| (r.entity.as_str(), r.date)).collect();
        assert_eq!(
            kept,
            vec![("a", d("2022-01-15")), ("a", d("2022-03-01")), ("b", d("2022-02-01"))]
        );
    }
}
