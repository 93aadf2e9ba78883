//! LunarCrush social provider.
//!
//! LunarCrush is keyed by ticker symbol, not CoinGecko id. Coins without a
//! known ticker have no social series.

use super::circuit_breaker::CircuitBreaker;
use super::http::{ApiKeyStyle, JsonClient, ProviderSettings};
use super::payload::UnixSeconds;
use super::provider::{ProviderError, Source, SourceFetcher};
use crate::domain::DateRange;
use crate::merge::SocialRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const LUNARCRUSH_URL: &str = "https://lunarcrush.com/api4";

#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(default)]
    data: Vec<SocialPoint>,
}

#[derive(Debug, Deserialize)]
struct SocialPoint {
    time: UnixSeconds,
    #[serde(default)]
    galaxy_score: Option<f64>,
    #[serde(default)]
    alt_rank: Option<f64>,
    #[serde(default)]
    social_dominance: Option<f64>,
    #[serde(default)]
    sentiment: Option<f64>,
}

/// Social metrics for one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SocialObservation {
    pub date: NaiveDate,
    pub galaxy_score: Option<f64>,
    pub alt_rank: Option<f64>,
    pub social_dominance: Option<f64>,
    pub sentiment: Option<f64>,
}

/// Social payload for one coin, as stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialPayload {
    pub observations: Vec<SocialObservation>,
}

impl SocialPayload {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn to_records(&self, entity: &str) -> Vec<SocialRecord> {
        self.observations
            .iter()
            .map(|o| SocialRecord {
                date: o.date,
                entity: entity.to_string(),
                galaxy_score: o.galaxy_score,
                alt_rank: o.alt_rank,
                social_dominance: o.social_dominance,
                sentiment: o.sentiment,
            })
            .collect()
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn daily_observations(points: Vec<SocialPoint>, range: &DateRange) -> Vec<SocialObservation> {
    let mut by_day = BTreeMap::new();
    for p in points {
        let Some(date) = p.time.date() else { continue };
        if !range.contains(date) {
            continue;
        }
        let obs = SocialObservation {
            date,
            galaxy_score: finite(p.galaxy_score),
            alt_rank: finite(p.alt_rank),
            social_dominance: finite(p.social_dominance),
            sentiment: finite(p.sentiment),
        };
        if obs.galaxy_score.is_some()
            || obs.alt_rank.is_some()
            || obs.social_dominance.is_some()
            || obs.sentiment.is_some()
        {
            by_day.insert(date, obs);
        }
    }
    by_day.into_values().collect()
}

pub struct LunarCrushClient {
    http: JsonClient,
    tickers: BTreeMap<String, String>,
}

impl LunarCrushClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let provider = Source::Social.provider();
        let http = JsonClient::new(
            provider,
            settings,
            ApiKeyStyle::Bearer,
            Arc::new(CircuitBreaker::for_provider(provider)),
        )?;
        Ok(Self {
            http,
            tickers: BTreeMap::new(),
        })
    }

    /// Entity id -> upper-case ticker.
    pub fn with_tickers(mut self, tickers: BTreeMap<String, String>) -> Self {
        self.tickers = tickers;
        self
    }

    pub fn ticker(&self, entity: &str) -> Option<&str> {
        self.tickers.get(entity).map(String::as_str).filter(|t| !t.is_empty())
    }
}

impl SourceFetcher for LunarCrushClient {
    type Payload = SocialPayload;

    fn source(&self) -> Source {
        Source::Social
    }

    fn fetch(&self, entity: &str, range: &DateRange) -> Result<SocialPayload, ProviderError> {
        let Some(ticker) = self.ticker(entity) else {
            debug!(entity, "no ticker, skipping social series");
            return Ok(SocialPayload::default());
        };

        let url = self.http.url(&format!("/public/coins/{ticker}/time-series/v2"));
        let query = [
            ("bucket", "day".to_string()),
            ("start", range.start_timestamp().to_string()),
            ("end", range.end_timestamp().to_string()),
        ];
        let resp: TimeSeriesResponse = match self.http.get_json(&url, &query, entity) {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => return Ok(SocialPayload::default()),
            Err(e) => return Err(e),
        };

        let observations = daily_observations(resp.data, range);
        debug!(entity, ticker, days = observations.len(), "fetched social series");
        Ok(SocialPayload { observations })
    }

    fn key_params(&self, entity: &str) -> Vec<(String, String)> {
        self.ticker(entity)
            .map(|t| vec![("ticker".to_string(), t.to_string())])
            .unwrap_or_default()
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
