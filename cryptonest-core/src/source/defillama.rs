//! DeFiLlama on-chain provider.
//!
//! Coins map to DeFiLlama by CoinGecko id: a coin may be the native asset of
//! a chain (chain TVL), the token of a protocol (protocol TVL, DEX volume),
//! both, or neither. The two maps are fetched once per run.

use super::circuit_breaker::CircuitBreaker;
use super::http::{ApiKeyStyle, JsonClient, ProviderSettings};
use super::payload::{by_date, daily_last, daily_sum, DatedValue, UnixSeconds};
use super::provider::{ProviderError, Source, SourceFetcher};
use crate::domain::DateRange;
use crate::merge::OnChainRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFILLAMA_URL: &str = "https://api.llama.fi";

/// `chainTvls` entries that are breakdowns of another entry rather than a chain.
const NON_CHAIN_TVL_KEYS: [&str; 7] = [
    "borrowed",
    "staking",
    "pool2",
    "vesting",
    "offers",
    "treasury",
    "doublecounted",
];

/// CoinGecko id to DeFiLlama identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlamaMaps {
    /// CoinGecko id -> protocol slug.
    pub protocols: BTreeMap<String, String>,
    /// CoinGecko id -> chain name.
    pub chains: BTreeMap<String, String>,
}

impl LlamaMaps {
    pub fn protocol(&self, entity: &str) -> Option<&str> {
        self.protocols.get(entity).map(String::as_str)
    }

    pub fn chain(&self, entity: &str) -> Option<&str> {
        self.chains.get(entity).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct ProtocolListing {
    #[serde(default)]
    gecko_id: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChainListing {
    #[serde(default)]
    gecko_id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TvlPoint {
    date: UnixSeconds,
    #[serde(rename = "totalLiquidityUSD", default)]
    total_liquidity_usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChainTvl {
    #[serde(default)]
    tvl: Vec<TvlPoint>,
}

#[derive(Debug, Deserialize)]
struct ProtocolResponse {
    #[serde(rename = "chainTvls", default)]
    chain_tvls: Option<BTreeMap<String, ChainTvl>>,
    #[serde(default)]
    tvl: Vec<TvlPoint>,
}

#[derive(Debug, Deserialize)]
struct DexSummaryResponse {
    #[serde(rename = "totalDataChart", default)]
    total_data_chart: Vec<(UnixSeconds, Option<f64>)>,
}

/// On-chain payload for one coin, as stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnChainPayload {
    pub chain_tvl: Vec<DatedValue>,
    pub protocol_tvl: Vec<DatedValue>,
    pub dex_volume: Vec<DatedValue>,
}

impl OnChainPayload {
    pub fn is_empty(&self) -> bool {
        self.chain_tvl.is_empty() && self.protocol_tvl.is_empty() && self.dex_volume.is_empty()
    }

    /// One record per day on which any of the three series has a value.
    pub fn to_records(&self, entity: &str) -> Vec<OnChainRecord> {
        let chain = by_date(&self.chain_tvl);
        let protocol = by_date(&self.protocol_tvl);
        let dex = by_date(&self.dex_volume);
        let dates: BTreeSet<_> = chain.keys().chain(protocol.keys()).chain(dex.keys()).copied().collect();

        dates
            .into_iter()
            .map(|date| OnChainRecord {
                date,
                entity: entity.to_string(),
                chain_tvl: chain.get(&date).copied(),
                protocol_tvl: protocol.get(&date).copied(),
                dex_volume: dex.get(&date).copied(),
            })
            .collect()
    }
}

fn tvl_points<'a, I>(
    points: I,
    range: &'a DateRange,
) -> impl Iterator<Item = (chrono::NaiveDate, f64)> + 'a
where
    I: IntoIterator<Item = &'a TvlPoint>,
    I::IntoIter: 'a,
{
    points.into_iter().filter_map(move |p| {
        let date = p.date.date()?;
        let value = p.total_liquidity_usd?;
        range.contains(date).then_some((date, value))
    })
}

/// Protocol TVL summed across chains, falling back to the flat `tvl` series
/// for single-chain protocols.
fn protocol_tvl(resp: &ProtocolResponse, range: &DateRange) -> Vec<DatedValue> {
    let chains: Vec<&ChainTvl> = resp
        .chain_tvls
        .iter()
        .flatten()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            !lower.contains('-') && !NON_CHAIN_TVL_KEYS.contains(&lower.as_str())
        })
        .map(|(_, tvl)| tvl)
        .collect();

    if chains.is_empty() {
        return daily_last(tvl_points(&resp.tvl, range));
    }
    daily_sum(chains.iter().flat_map(|c| tvl_points(&c.tvl, range)))
}

fn dex_volume(resp: DexSummaryResponse, range: &DateRange) -> Vec<DatedValue> {
    daily_last(resp.total_data_chart.into_iter().filter_map(|(ts, value)| {
        let date = ts.date()?;
        let value = value?;
        range.contains(date).then_some((date, value))
    }))
}

/// `NotFound` on a sub-request means "no such series"; anything else fails
/// the whole fetch so a partial payload is never cached.
fn optional<T>(result: Result<T, ProviderError>, what: &str, entity: &str) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => {
            warn!(entity, what, "DeFiLlama has no series");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub struct DefiLlamaClient {
    http: JsonClient,
    maps: LlamaMaps,
}

impl DefiLlamaClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let provider = Source::OnChain.provider();
        let http = JsonClient::new(
            provider,
            settings,
            ApiKeyStyle::Header("api-key"),
            Arc::new(CircuitBreaker::for_provider(provider)),
        )?;
        Ok(Self {
            http,
            maps: LlamaMaps::default(),
        })
    }

    pub fn with_maps(mut self, maps: LlamaMaps) -> Self {
        self.maps = maps;
        self
    }

    pub fn maps(&self) -> &LlamaMaps {
        &self.maps
    }

    /// `/protocols`: CoinGecko id -> protocol slug.
    pub fn fetch_protocol_map(&self) -> Result<BTreeMap<String, String>, ProviderError> {
        let rows: Vec<ProtocolListing> = self.http.get_json(&self.http.url("/protocols"), &[], "protocols")?;
        let mut map = BTreeMap::new();
        for row in rows {
            if let (Some(id), Some(slug)) = (row.gecko_id, row.slug) {
                if !id.is_empty() && !slug.is_empty() {
                    // First listing wins when several protocols share a token.
                    map.entry(id).or_insert(slug);
                }
            }
        }
        debug!(protocols = map.len(), "fetched protocol map");
        Ok(map)
    }

    /// `/chains`: CoinGecko id -> chain name.
    pub fn fetch_chain_map(&self) -> Result<BTreeMap<String, String>, ProviderError> {
        let rows: Vec<ChainListing> = self.http.get_json(&self.http.url("/chains"), &[], "chains")?;
        let mut map = BTreeMap::new();
        for row in rows {
            if let Some(id) = row.gecko_id.filter(|id| !id.is_empty()) {
                map.entry(id).or_insert(row.name);
            }
        }
        debug!(chains = map.len(), "fetched chain map");
        Ok(map)
    }

    fn chain_tvl(&self, chain: &str, range: &DateRange) -> Result<Vec<DatedValue>, ProviderError> {
        let points: Vec<TvlPoint> = self.http.get_json(&self.http.url(&format!("/charts/{chain}")), &[], chain)?;
        Ok(daily_last(tvl_points(&points, range)))
    }

    fn protocol(&self, slug: &str) -> Result<ProtocolResponse, ProviderError> {
        self.http.get_json(&self.http.url(&format!("/protocol/{slug}")), &[], slug)
    }

    fn dex_summary(&self, slug: &str) -> Result<DexSummaryResponse, ProviderError> {
        let query = [
            ("excludeTotalDataChart", "false".to_string()),
            ("excludeTotalDataChartBreakdown", "true".to_string()),
        ];
        self.http.get_json(&self.http.url(&format!("/summary/dexs/{slug}")), &query, slug)
    }
}

impl SourceFetcher for DefiLlamaClient {
    type Payload = OnChainPayload;

    fn source(&self) -> Source {
        Source::OnChain
    }

    /// Coins absent from both maps yield an empty payload, which is a valid
    /// cached answer.
    fn fetch(&self, entity: &str, range: &DateRange) -> Result<OnChainPayload, ProviderError> {
        let mut payload = OnChainPayload::default();

        if let Some(chain) = self.maps.chain(entity) {
            payload.chain_tvl = optional(self.chain_tvl(chain, range), "chain tvl", entity)?.unwrap_or_default();
        }
        if let Some(slug) = self.maps.protocol(entity) {
            if let Some(resp) = optional(self.protocol(slug), "protocol tvl", entity)? {
                payload.protocol_tvl = protocol_tvl(&resp, range);
            }
            if let Some(resp) = optional(self.dex_summary(slug), "dex volume", entity)? {
                payload.dex_volume = dex_volume(resp, range);
            }
        }

        debug!(
            entity,
            chain_days = payload.chain_tvl.len(),
            protocol_days = payload.protocol_tvl.len(),
            dex_days = payload.dex_volume.len(),
            "fetched on-chain series"
        );
        Ok(payload)
    }

    /// The resolved slugs are part of the key: a remapped coin must not reuse
    /// a payload fetched under its old identity.
    fn key_params(&self, entity: &str) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(chain) = self.maps.chain(entity) {
            params.push(("chain".to_string(), chain.to_string()));
        }
        if let Some(slug) = self.maps.protocol(entity) {
            params.push(("protocol".to_string(), slug.to_string()));
        }
        params
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
