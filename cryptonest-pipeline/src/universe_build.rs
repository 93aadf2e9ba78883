//! Universe build: candidate listing -> market-cap history -> monthly top-N.

use crate::error::PipelineError;
use crate::fetch::{fetch_all, FetchReport};
use crate::progress::FetchProgress;
use chrono::NaiveDate;
use cryptonest_core::cache::{CacheError, CacheKey, CacheManager};
use cryptonest_core::domain::{AssetTimeSeries, DateRange, EntityId};
use cryptonest_core::source::{
    CachedFetcher, CoinGeckoClient, MarketListing, MarketPayload, ProviderError, SourceFetcher,
};
use cryptonest_core::universe::{ticker_map, CandidatePool, UniverseReconstructor, UniverseSnapshot};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Anything that can list the current top coins by market cap.
pub trait CandidateSource: Send + Sync {
    fn fetch_listings(&self, count: usize) -> Result<Vec<MarketListing>, ProviderError>;
}

impl CandidateSource for CoinGeckoClient {
    fn fetch_listings(&self, count: usize) -> Result<Vec<MarketListing>, ProviderError> {
        CoinGeckoClient::fetch_listings(self, count)
    }
}

/// The current top-`count` listing, cached per calendar day.
pub fn load_candidates(
    source: &dyn CandidateSource,
    cache: &CacheManager,
    count: usize,
    as_of: NaiveDate,
) -> Result<Vec<MarketListing>, CacheError> {
    let key = CacheKey::builder("listings", "coingecko")
        .param("count", count)
        .param("as_of", as_of)
        .build();
    let listings: Vec<MarketListing> = cache.fetch_or_load(&key, || source.fetch_listings(count))?;
    info!(candidates = listings.len(), %as_of, "loaded candidate listing");
    Ok(listings)
}

#[derive(Debug)]
pub struct UniverseBuild {
    pub snapshot: UniverseSnapshot,
    pub pool: CandidatePool,
    /// Entity id -> upper-case ticker, from the candidate listing.
    pub tickers: BTreeMap<EntityId, String>,
    pub market: FetchReport<MarketPayload>,
}

/// Fetch market history for every candidate and reconstruct the universe.
///
/// Candidates whose history cannot be fetched are left out of every month,
/// like candidates with no data.
pub fn build_universe<M>(
    reconstructor: &UniverseReconstructor,
    listings: &[MarketListing],
    market: &CachedFetcher<M>,
    range: &DateRange,
    max_in_flight: usize,
    progress: &dyn FetchProgress,
) -> Result<UniverseBuild, PipelineError>
where
    M: SourceFetcher<Payload = MarketPayload>,
{
    let pool = CandidatePool::from_listings(listings);
    let tickers = ticker_map(listings);
    info!(
        candidates = pool.len(),
        range = %range,
        "fetching market history for candidate pool"
    );

    let report = fetch_all(market, pool.ids(), range, max_in_flight, progress)?;
    for (entity, e) in &report.failures {
        warn!(entity = entity.as_str(), error = %e, "candidate excluded: no market history");
    }

    let series: BTreeMap<EntityId, AssetTimeSeries> = report
        .payloads
        .iter()
        .map(|(id, payload)| (id.clone(), payload.market_cap_series(id)))
        .filter(|(_, s)| !s.is_empty())
        .collect();

    let snapshot = reconstructor.reconstruct(&pool, &series)?;
    Ok(UniverseBuild {
        snapshot,
        pool,
        tickers,
        market: report,
    })
}
