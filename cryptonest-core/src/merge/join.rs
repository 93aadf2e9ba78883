//! Identity-resolving left-outer join of the three sources.
//!
//! Rows are keyed by (canonical id, date). The market source decides which
//! keys exist; on-chain and social rows only fill in attributes. When several
//! raw ids fold into one canonical id on the same date, each attribute is
//! combined according to [`field_policy`].

use super::identity::IdentityTable;
use super::records::{MarketRecord, MergedRecord, OnChainRecord, RecordsBySource, SocialRecord};
use crate::domain::EntityId;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// How variant values of one attribute are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Flows and stocks that add up across variants: summed.
    Additive,
    /// Per-unit prices and scores: arithmetic mean.
    Averaged,
}

/// Aggregation rule per numeric column of [`MergedRecord`].
pub const FIELD_POLICIES: [(&str, FieldKind); 13] = [
    ("open", FieldKind::Averaged),
    ("high", FieldKind::Averaged),
    ("low", FieldKind::Averaged),
    ("close", FieldKind::Averaged),
    ("volume", FieldKind::Additive),
    ("market_cap", FieldKind::Additive),
    ("chain_tvl", FieldKind::Additive),
    ("protocol_tvl", FieldKind::Additive),
    ("dex_volume", FieldKind::Additive),
    ("lc_galaxy_score", FieldKind::Averaged),
    ("lc_alt_rank", FieldKind::Averaged),
    ("lc_social_dominance", FieldKind::Averaged),
    ("lc_sentiment", FieldKind::Averaged),
];

/// The aggregation rule for `column`, or `None` for non-numeric columns.
/// Only present values take part; a field absent for every variant stays absent.
pub fn field_policy(column: &str) -> Option<FieldKind> {
    FIELD_POLICIES
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, kind)| *kind)
}

/// Several raw ids resolved to one canonical id on the same date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCollision {
    pub date: NaiveDate,
    pub canonical_id: EntityId,
    pub raw_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutput {
    /// Sorted by (canonical id, date).
    pub records: Vec<MergedRecord>,
    pub collisions: Vec<IdentityCollision>,
}

fn combine(kind: FieldKind, values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = values.into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    let sum: f64 = present.iter().sum();
    Some(match kind {
        FieldKind::Additive => sum,
        FieldKind::Averaged => sum / present.len() as f64,
    })
}

type Key = (EntityId, NaiveDate);

fn group<'a, T>(
    rows: &'a [T],
    identities: &IdentityTable,
    key: impl Fn(&T) -> (&str, NaiveDate),
) -> BTreeMap<Key, Vec<&'a T>> {
    let mut groups: BTreeMap<Key, Vec<&T>> = BTreeMap::new();
    for row in rows {
        let (raw, date) = key(row);
        groups
            .entry((identities.canonical(raw).to_string(), date))
            .or_default()
            .push(row);
    }
    groups
}

/// Combine `column` across the rows of one group under its [`field_policy`].
fn merged_field<'a, T: 'a>(
    column: &str,
    rows: impl IntoIterator<Item = &'a T>,
    value: impl Fn(&T) -> Option<f64>,
) -> Option<f64> {
    let Some(kind) = field_policy(column) else {
        warn!(column, "no aggregation rule for column, leaving it empty");
        return None;
    };
    combine(kind, rows.into_iter().map(value))
}

/// Join `records` into one row per (canonical id, date) present in the
/// market source.
pub fn merge(records: &RecordsBySource, identities: &IdentityTable) -> MergeOutput {
    let market = group(&records.market, identities, |r| (r.entity.as_str(), r.date));
    let on_chain = group(&records.on_chain, identities, |r| (r.entity.as_str(), r.date));
    let social = group(&records.social, identities, |r| (r.entity.as_str(), r.date));

    let mut out = MergeOutput::default();
    let mut collided: BTreeMap<&str, usize> = BTreeMap::new();

    for ((canonical, date), rows) in &market {
        let raw_ids: BTreeSet<&str> = rows.iter().map(|r| r.entity.as_str()).collect();
        if raw_ids.len() > 1 {
            *collided.entry(canonical.as_str()).or_default() += 1;
            out.collisions.push(IdentityCollision {
                date: *date,
                canonical_id: canonical.clone(),
                raw_ids: raw_ids.iter().map(|s| s.to_string()).collect(),
            });
        }

        let coin_id = if raw_ids.contains(canonical.as_str()) {
            canonical.as_str()
        } else {
            raw_ids.iter().next().copied().unwrap_or(canonical.as_str())
        };
        let ticker = rows
            .iter()
            .find(|r| r.entity == coin_id)
            .and_then(|r| r.ticker.clone())
            .or_else(|| {
                let mut sorted: Vec<&&MarketRecord> = rows.iter().collect();
                sorted.sort_by(|a, b| a.entity.cmp(&b.entity));
                sorted.into_iter().find_map(|r| r.ticker.clone())
            });

        let key = (canonical.clone(), *date);
        let mkt = |column: &str, f: fn(&MarketRecord) -> Option<f64>| {
            merged_field(column, rows.iter().copied(), f)
        };
        let chain = |column: &str, f: fn(&OnChainRecord) -> Option<f64>| {
            merged_field(column, on_chain.get(&key).into_iter().flatten().copied(), f)
        };
        let soc = |column: &str, f: fn(&SocialRecord) -> Option<f64>| {
            merged_field(column, social.get(&key).into_iter().flatten().copied(), f)
        };

        out.records.push(MergedRecord {
            date: *date,
            coin_id: coin_id.to_string(),
            ticker,
            open: mkt("open", |r| r.open),
            high: mkt("high", |r| r.high),
            low: mkt("low", |r| r.low),
            close: mkt("close", |r| r.close),
            volume: mkt("volume", |r| r.volume),
            market_cap: mkt("market_cap", |r| r.market_cap),
            chain_tvl: chain("chain_tvl", |r| r.chain_tvl),
            protocol_tvl: chain("protocol_tvl", |r| r.protocol_tvl),
            dex_volume: chain("dex_volume", |r| r.dex_volume),
            lc_galaxy_score: soc("lc_galaxy_score", |r| r.galaxy_score),
            lc_alt_rank: soc("lc_alt_rank", |r| r.alt_rank),
            lc_social_dominance: soc("lc_social_dominance", |r| r.social_dominance),
            lc_sentiment: soc("lc_sentiment", |r| r.sentiment),
            canonical_id: canonical.clone(),
        });
    }

    for (canonical, days) in collided {
        warn!(canonical, days, "variant ids collapsed into one canonical entity");
    }
    out
}
