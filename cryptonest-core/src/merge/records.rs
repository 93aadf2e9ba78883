//! Per-source rows and the unified merged row.
//!
//! Every attribute is an `Option`: `None` means the source had nothing for
//! that (date, entity), which downstream consumers must be able to tell apart
//! from a genuine zero.

use crate::domain::EntityId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Market row (CoinGecko). Authoritative for row existence in the merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub date: NaiveDate,
    pub entity: EntityId,
    pub ticker: Option<String>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
}

/// On-chain row (DeFiLlama).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainRecord {
    pub date: NaiveDate,
    pub entity: EntityId,
    pub chain_tvl: Option<f64>,
    pub protocol_tvl: Option<f64>,
    pub dex_volume: Option<f64>,
}

/// Social row (LunarCrush).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialRecord {
    pub date: NaiveDate,
    pub entity: EntityId,
    pub galaxy_score: Option<f64>,
    pub alt_rank: Option<f64>,
    pub social_dominance: Option<f64>,
    pub sentiment: Option<f64>,
}

/// Input to the merge: raw-entity rows from each source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordsBySource {
    pub market: Vec<MarketRecord>,
    pub on_chain: Vec<OnChainRecord>,
    pub social: Vec<SocialRecord>,
}

impl RecordsBySource {
    pub fn extend(&mut self, other: RecordsBySource) {
        self.market.extend(other.market);
        self.on_chain.extend(other.on_chain);
        self.social.extend(other.social);
    }

    pub fn is_empty(&self) -> bool {
        self.market.is_empty() && self.on_chain.is_empty() && self.social.is_empty()
    }

    /// Keep only rows for which `keep(entity, date)` holds.
    pub fn retain(&mut self, keep: impl Fn(&str, NaiveDate) -> bool) {
        self.market.retain(|r| keep(&r.entity, r.date));
        self.on_chain.retain(|r| keep(&r.entity, r.date));
        self.social.retain(|r| keep(&r.entity, r.date));
    }
}

/// One row of the merged dataset: one (date, canonical entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub date: NaiveDate,
    /// Raw identifier the row is reported under: the canonical id itself when
    /// it contributed, otherwise the smallest contributing variant id.
    pub coin_id: EntityId,
    pub ticker: Option<String>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub chain_tvl: Option<f64>,
    pub protocol_tvl: Option<f64>,
    pub dex_volume: Option<f64>,
    pub lc_galaxy_score: Option<f64>,
    pub lc_alt_rank: Option<f64>,
    pub lc_social_dominance: Option<f64>,
    pub lc_sentiment: Option<f64>,
    pub canonical_id: EntityId,
}
