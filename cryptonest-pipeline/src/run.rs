//! Command entry points: wire config into stores, clients and stages.

use crate::config::{CacheSettings, ConfigError, IdentitySettings, PipelineConfig};
use crate::dashboard::{dashboard_range, dashboard_snapshot};
use crate::dataset_build::{assemble_dataset, load_llama_maps, Concurrency, DatasetBuild, Sources};
use crate::error::PipelineError;
use crate::progress::FetchProgress;
use crate::universe_build::{build_universe, load_candidates, UniverseBuild};
use chrono::NaiveDate;
use cryptonest_core::cache::{
    CacheManager, CacheStore, GcsStore, LocalDirStore, TieredStore,
};
use cryptonest_core::domain::{DateRange, EntityId};
use cryptonest_core::merge::IdentityTable;
use cryptonest_core::source::{
    CachedFetcher, CoinGeckoClient, DefiLlamaClient, LunarCrushClient, MarketListing,
};
use cryptonest_core::universe::{ticker_map, UniverseReconstructor, UniverseSnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Local directory store, fronting the remote bucket when one is configured.
pub fn open_cache(settings: &CacheSettings) -> Result<Arc<CacheManager>, PipelineError> {
    let local = LocalDirStore::new(&settings.local_dir);
    let store: Arc<dyn CacheStore> = match &settings.remote {
        None => Arc::new(local),
        Some(remote) => {
            let token = std::env::var(&remote.token_env).map_err(|_| ConfigError::MissingCredential {
                var: remote.token_env.clone(),
            })?;
            let timeout = Duration::from_secs(remote.timeout_secs);
            let gcs = match &remote.endpoint {
                Some(endpoint) => GcsStore::with_endpoint(endpoint, &remote.bucket, token, timeout)?,
                None => GcsStore::new(&remote.bucket, token, timeout)?,
            };
            Arc::new(TieredStore::new(local, gcs))
        }
    };
    info!(store = store.name(), local_dir = %settings.local_dir.display(), "cache opened");
    Ok(Arc::new(
        CacheManager::new(store)
            .with_retry(settings.retry.policy())
            .with_store_failure_policy(settings.on_store_error),
    ))
}

/// The configured identity table, or the built-in one.
pub fn load_identities(settings: &IdentitySettings) -> Result<IdentityTable, PipelineError> {
    let table = match &settings.table {
        Some(path) => IdentityTable::load(path)?,
        None => IdentityTable::builtin(),
    };
    info!(aliases = table.len(), custom = settings.table.is_some(), "identity table loaded");
    for (raw, canonical) in table.aliases() {
        debug!(raw, canonical, "identity alias");
    }
    Ok(table)
}

fn research_range(config: &PipelineConfig, today: NaiveDate) -> DateRange {
    DateRange::new(config.universe.start_date, config.end_date(today))
}

fn coingecko(config: &PipelineConfig) -> Result<Arc<CoinGeckoClient>, PipelineError> {
    Ok(Arc::new(CoinGeckoClient::new(&config.providers.coingecko.settings()?)?))
}

/// `universe build`: reconstruct and save the point-in-time universe.
pub fn run_universe_build(
    config: &PipelineConfig,
    today: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<UniverseBuild, PipelineError> {
    let cache = open_cache(&config.cache)?;
    let cg = coingecko(config)?;
    let listings = load_candidates(cg.as_ref(), &cache, config.universe.candidate_size, today)?;
    let market = CachedFetcher::new(Arc::clone(&cg), Arc::clone(&cache));

    let reconstructor = UniverseReconstructor::new(config.universe.start_date, config.universe.universe_size);
    let build = build_universe(
        &reconstructor,
        &listings,
        &market,
        &research_range(config, today),
        config.providers.coingecko.max_in_flight,
        progress,
    )?;
    build.snapshot.save(&config.output.universe_file)?;
    info!(
        path = %config.output.universe_file.display(),
        months = build.snapshot.len(),
        stats = ?cache.stats(),
        "universe saved"
    );
    Ok(build)
}

fn assemble(
    config: &PipelineConfig,
    cache: &Arc<CacheManager>,
    cg: Arc<CoinGeckoClient>,
    snapshot: &UniverseSnapshot,
    tickers: BTreeMap<EntityId, String>,
    range: &DateRange,
    progress: &dyn FetchProgress,
) -> Result<DatasetBuild, PipelineError> {
    let llama = DefiLlamaClient::new(&config.providers.defillama.settings()?)?;
    let maps = load_llama_maps(&llama, cache)?;
    let llama = llama.with_maps(maps);
    let lunar = LunarCrushClient::new(&config.providers.lunarcrush.settings()?)?.with_tickers(tickers.clone());

    let sources = Sources {
        market: CachedFetcher::new(cg, Arc::clone(cache)),
        on_chain: CachedFetcher::new(llama, Arc::clone(cache)),
        social: CachedFetcher::new(lunar, Arc::clone(cache)),
    };
    let limits = Concurrency {
        market: config.providers.coingecko.max_in_flight,
        on_chain: config.providers.defillama.max_in_flight,
        social: config.providers.lunarcrush.max_in_flight,
    };
    let identities = load_identities(&config.identity)?;
    assemble_dataset(snapshot, &sources, &tickers, &identities, range, limits, progress)
}

fn listings_and_tickers(
    config: &PipelineConfig,
    cg: &CoinGeckoClient,
    cache: &CacheManager,
    today: NaiveDate,
) -> Result<(Vec<MarketListing>, BTreeMap<EntityId, String>), PipelineError> {
    let listings = load_candidates(cg, cache, config.universe.candidate_size, today)?;
    let tickers = ticker_map(&listings);
    Ok((listings, tickers))
}

/// `dataset build`: assemble the research dataset for the saved universe.
pub fn run_dataset_build(
    config: &PipelineConfig,
    today: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<DatasetBuild, PipelineError> {
    let snapshot = UniverseSnapshot::load(&config.output.universe_file)?;
    if snapshot.is_empty() {
        return Err(PipelineError::NoData(format!(
            "universe file {} has no months; run `universe build` first",
            config.output.universe_file.display()
        )));
    }
    let cache = open_cache(&config.cache)?;
    let cg = coingecko(config)?;
    let (_, tickers) = listings_and_tickers(config, &cg, &cache, today)?;

    let build = assemble(config, &cache, cg, &snapshot, tickers, &research_range(config, today), progress)?;
    build.write(&config.output.dataset_file)?;
    info!(stats = ?cache.stats(), "dataset build complete");
    Ok(build)
}

/// `dashboard`: month-to-date dataset for today's top-N.
pub fn run_dashboard(
    config: &PipelineConfig,
    today: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<DatasetBuild, PipelineError> {
    let cache = open_cache(&config.cache)?;
    let cg = coingecko(config)?;
    let (listings, tickers) = listings_and_tickers(config, &cg, &cache, today)?;
    let snapshot = dashboard_snapshot(&listings, config.universe.universe_size, today)?;

    let build = assemble(config, &cache, cg, &snapshot, tickers, &dashboard_range(today), progress)?;
    build.write(&config.output.dashboard_file)?;
    info!(stats = ?cache.stats(), "dashboard build complete");
    Ok(build)
}
