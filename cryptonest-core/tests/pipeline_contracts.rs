//! Cross-module contracts: cache idempotence and failure isolation through a
//! cached fetcher, identity collapse, and dataset schema stability.

use chrono::NaiveDate;
use cryptonest_core::cache::{
    CacheError, CacheManager, MemoryStore, RetryPolicy, StoreFailurePolicy,
};
use cryptonest_core::dataset::{read_dataframe, write_parquet, DatasetSchema};
use cryptonest_core::domain::DateRange;
use cryptonest_core::merge::{merge, IdentityTable, MarketRecord, RecordsBySource};
use cryptonest_core::source::{
    CachedFetcher, DatedValue, MarketPayload, ProviderError, Source, SourceFetcher,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn range() -> DateRange {
    DateRange::new(d("2024-01-01"), d("2024-01-31"))
}

/// Market fetcher that fails for ids starting with `fail`.
struct FakeMarket {
    calls: AtomicUsize,
}

impl SourceFetcher for FakeMarket {
    type Payload = MarketPayload;

    fn source(&self) -> Source {
        Source::Market
    }

    fn fetch(&self, entity: &str, range: &DateRange) -> Result<MarketPayload, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if entity.starts_with("fail") {
            return Err(ProviderError::Timeout {
                provider: "fake".into(),
                timeout_secs: 1,
            });
        }
        let point = DatedValue { date: range.start, value: entity.len() as f64 };
        Ok(MarketPayload {
            prices: vec![point],
            market_caps: vec![point],
            volumes: vec![],
            ohlc: vec![],
        })
    }
}

#[test]
fn cache_hit_returns_identical_payload_without_fetching() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(CacheManager::new(store.clone()));
    let fetcher = CachedFetcher::new(FakeMarket { calls: AtomicUsize::new(0) }, cache);

    let first = fetcher.fetch("bitcoin", &range()).unwrap();
    let stored = store.raw(&fetcher.key("bitcoin", &range())).unwrap();
    for _ in 0..3 {
        assert_eq!(fetcher.fetch("bitcoin", &range()).unwrap(), first);
    }
    assert_eq!(fetcher.inner().calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.put_count(), 1);
    assert_eq!(store.raw(&fetcher.key("bitcoin", &range())).unwrap(), stored);
}

#[test]
fn failed_fetch_leaves_store_untouched() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(CacheManager::new(store.clone()));
    let fetcher = CachedFetcher::new(FakeMarket { calls: AtomicUsize::new(0) }, cache);

    let err = fetcher.fetch("fail-coin", &range()).unwrap_err();
    assert!(matches!(err, CacheError::Fetch { .. }));
    assert!(store.is_empty());

    // The next call tries again rather than replaying the failure.
    let _ = fetcher.fetch("fail-coin", &range());
    assert_eq!(fetcher.inner().calls.load(Ordering::SeqCst), 2);
}

#[test]
fn store_outage_is_distinct_and_policy_driven() {
    let store = Arc::new(MemoryStore::new());
    store.set_read_failure(true);

    let abort = CachedFetcher::new(
        FakeMarket { calls: AtomicUsize::new(0) },
        Arc::new(CacheManager::new(store.clone()).with_retry(RetryPolicy::none())),
    );
    let err = abort.fetch("bitcoin", &range()).unwrap_err();
    assert!(err.is_store_failure());
    assert_eq!(abort.inner().calls.load(Ordering::SeqCst), 0);

    let degrade = CachedFetcher::new(
        FakeMarket { calls: AtomicUsize::new(0) },
        Arc::new(
            CacheManager::new(store.clone())
                .with_retry(RetryPolicy::none())
                .with_store_failure_policy(StoreFailurePolicy::FetchLive),
        ),
    );
    assert!(degrade.fetch("bitcoin", &range()).is_ok());
    assert_eq!(degrade.inner().calls.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_misses_on_one_key_never_corrupt() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(CacheManager::new(store.clone()));
    let fetcher = Arc::new(CachedFetcher::new(FakeMarket { calls: AtomicUsize::new(0) }, cache));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let f = Arc::clone(&fetcher);
            std::thread::spawn(move || f.fetch("ethereum", &range()).unwrap())
        })
        .collect();
    let results: Vec<MarketPayload> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.len(), 1);
    assert_eq!(fetcher.fetch("ethereum", &range()).unwrap(), results[0]);
}

fn market(entity: &str, date: &str, close: f64, volume: f64) -> MarketRecord {
    MarketRecord {
        date: d(date),
        entity: entity.into(),
        ticker: None,
        open: Some(close),
        high: Some(close),
        low: Some(close),
        close: Some(close),
        volume: Some(volume),
        market_cap: None,
    }
}

#[test]
fn wrapped_bitcoin_volume_adds_and_prices_average() {
    let records = RecordsBySource {
        market: vec![
            market("wrapped-bitcoin", "2024-01-01", 100.0, 5.0),
            market("bitcoin", "2024-01-01", 102.0, 1000.0),
        ],
        ..Default::default()
    };
    let out = merge(&records, &IdentityTable::builtin());
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].volume, Some(1005.0));
    assert_eq!(out.records[0].close, Some(101.0));
    assert_eq!(out.records[0].open, Some(101.0));
    assert_eq!(out.collisions.len(), 1);
}

#[test]
fn research_and_dashboard_files_share_schema() {
    let dir = tempfile::tempdir().unwrap();
    let research = RecordsBySource {
        market: vec![market("bitcoin", "2022-01-03", 1.0, 2.0), market("ethereum", "2022-01-03", 3.0, 4.0)],
        ..Default::default()
    };
    let dashboard = RecordsBySource::default();

    let a = dir.path().join("research.parquet");
    let b = dir.path().join("dashboard.parquet");
    write_parquet(&merge(&research, &IdentityTable::builtin()).records, &a).unwrap();
    write_parquet(&merge(&dashboard, &IdentityTable::builtin()).records, &b).unwrap();

    let (fa, fb) = (read_dataframe(&a).unwrap(), read_dataframe(&b).unwrap());
    assert_eq!(fa.schema(), fb.schema());
    assert_eq!(fa.height(), 2);
    assert_eq!(fb.height(), 0);
    DatasetSchema::validate(&fb).unwrap();
}
