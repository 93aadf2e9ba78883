//! Source fetcher trait and structured provider errors.
//!
//! A `SourceFetcher` retrieves one entity's raw series from one provider. The
//! cache layer sits above this trait: fetchers never see the cache, and the
//! cache never sees provider-specific types beyond their serialized payload.

use crate::domain::DateRange;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The three data families merged into the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Price, volume, market cap and OHLC (CoinGecko).
    Market,
    /// Chain TVL, protocol TVL, DEX volume (DeFiLlama).
    OnChain,
    /// Social metrics (LunarCrush).
    Social,
}

impl Source {
    /// Stable identifier used as the first component of cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Market => "market",
            Source::OnChain => "onchain",
            Source::Social => "social",
        }
    }

    /// Name of the upstream provider serving this source.
    pub fn provider(&self) -> &'static str {
        match self {
            Source::Market => "coingecko",
            Source::OnChain => "defillama",
            Source::Social => "lunarcrush",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a remote provider. Never cached.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: network unreachable: {reason}")]
    Network { provider: String, reason: String },

    #[error("{provider}: request timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },

    #[error("{provider}: rate limited (retry after {retry_after_secs}s)")]
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },

    #[error("{provider}: authentication failed: {reason}")]
    Authentication { provider: String, reason: String },

    #[error("{provider}: no data for '{entity}'")]
    NotFound { provider: String, entity: String },

    #[error("{provider}: unexpected response format: {reason}")]
    ResponseFormat { provider: String, reason: String },

    #[error("{provider}: HTTP {status} for '{entity}'")]
    Http {
        provider: String,
        entity: String,
        status: u16,
    },

    #[error("{provider}: circuit breaker open, requests refused")]
    CircuitBreakerTripped { provider: String },

    #[error("{provider}: client configuration error: {reason}")]
    Configuration { provider: String, reason: String },
}

impl ProviderError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network { .. }
            | ProviderError::Timeout { .. }
            | ProviderError::RateLimited { .. } => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Network { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::Authentication { provider, .. }
            | ProviderError::NotFound { provider, .. }
            | ProviderError::ResponseFormat { provider, .. }
            | ProviderError::Http { provider, .. }
            | ProviderError::CircuitBreakerTripped { provider }
            | ProviderError::Configuration { provider, .. } => provider,
        }
    }
}

/// Retrieves raw data for one entity from one provider.
///
/// Rate limiting, authentication and transport retries are the fetcher's
/// business. The payload is a typed, source-specific structure that is
/// serialized verbatim into the cache.
pub trait SourceFetcher: Send + Sync {
    type Payload: Serialize + DeserializeOwned + Send;

    fn source(&self) -> Source;

    /// Fetch the entity's series over `range`.
    fn fetch(&self, entity: &str, range: &DateRange) -> Result<Self::Payload, ProviderError>;

    /// Extra request parameters that distinguish logically different requests
    /// for the same entity and range (e.g. the resolved provider slug).
    fn key_params(&self, _entity: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether the provider is currently accepting requests.
    fn is_available(&self) -> bool {
        true
    }
}

impl<F: SourceFetcher + ?Sized> SourceFetcher for Arc<F> {
    type Payload = F::Payload;

    fn source(&self) -> Source {
        (**self).source()
    }

    fn fetch(&self, entity: &str, range: &DateRange) -> Result<Self::Payload, ProviderError> {
        (**self).fetch(entity, range)
    }

    fn key_params(&self, entity: &str) -> Vec<(String, String)> {
        (**self).key_params(entity)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let t = ProviderError::Timeout {
            provider: "coingecko".into(),
            timeout_secs: 30,
        };
        assert!(t.is_transient());
        let s = ProviderError::Http {
            provider: "coingecko".into(),
            entity: "bitcoin".into(),
            status: 503,
        };
        assert!(s.is_transient());
        let nf = ProviderError::NotFound {
            provider: "defillama".into(),
            entity: "foo".into(),
        };
        assert!(!nf.is_transient());
        assert!(nf.is_not_found());
        assert_eq!(nf.provider(), "defillama");
    }

    #[test]
    fn source_identifiers_are_stable() {
        assert_eq!(Source::Market.as_str(), "market");
        assert_eq!(Source::OnChain.provider(), "defillama");
        assert_eq!(Source::Social.to_string(), "social");
    }
}
