//! Provider adapters and the fetcher abstraction they implement.

pub mod cached;
pub mod circuit_breaker;
pub mod coingecko;
pub mod defillama;
pub mod http;
pub mod lunarcrush;
pub mod payload;
pub mod provider;

pub use cached::CachedFetcher;
pub use circuit_breaker::CircuitBreaker;
pub use coingecko::{CoinGeckoClient, MarketListing, MarketPayload, OhlcBar, COINGECKO_PRO_URL};
pub use defillama::{DefiLlamaClient, LlamaMaps, OnChainPayload, DEFILLAMA_URL};
pub use http::{ApiKeyStyle, JsonClient, ProviderSettings};
pub use lunarcrush::{LunarCrushClient, SocialObservation, SocialPayload, LUNARCRUSH_URL};
pub use payload::DatedValue;
pub use provider::{ProviderError, Source, SourceFetcher};
