//! Cryptonest Core: point-in-time universe reconstruction, fetch cache,
//! provider adapters and multi-source merge.
//!
//! - Domain types (dates, month buckets, market-cap series)
//! - Content-addressed cache over swappable stores (memory, local, GCS, tiered)
//! - Source fetchers for CoinGecko, DeFiLlama and LunarCrush
//! - Monthly top-N universe reconstruction and the snapshot file
//! - Canonical identity resolution and the left-outer merge
//! - Parquet dataset schema, writer and reader

pub mod cache;
pub mod dataset;
pub mod domain;
pub mod merge;
pub mod source;
pub mod universe;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the pipeline shares across fetch
    /// workers is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<cache::CacheManager>();
        require_sync::<cache::CacheManager>();
        require_send::<cache::MemoryStore>();
        require_sync::<cache::MemoryStore>();
        require_send::<cache::LocalDirStore>();
        require_sync::<cache::LocalDirStore>();
        require_send::<cache::GcsStore>();
        require_sync::<cache::GcsStore>();
        require_send::<cache::TieredStore<cache::LocalDirStore, cache::GcsStore>>();
        require_sync::<cache::TieredStore<cache::LocalDirStore, cache::GcsStore>>();

        require_send::<source::CoinGeckoClient>();
        require_sync::<source::CoinGeckoClient>();
        require_send::<source::DefiLlamaClient>();
        require_sync::<source::DefiLlamaClient>();
        require_send::<source::LunarCrushClient>();
        require_sync::<source::LunarCrushClient>();
        require_send::<source::CachedFetcher<source::CoinGeckoClient>>();
        require_sync::<source::CachedFetcher<source::CoinGeckoClient>>();

        require_send::<universe::UniverseSnapshot>();
        require_sync::<universe::UniverseSnapshot>();
        require_send::<merge::IdentityTable>();
        require_sync::<merge::IdentityTable>();
        require_send::<merge::MergedRecord>();
        require_sync::<merge::MergedRecord>();
    }
}
