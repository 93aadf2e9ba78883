//! Candidate pool: the ordered set of entities eligible for ranking.

use crate::domain::EntityId;
use crate::source::MarketListing;
use std::collections::{BTreeMap, HashSet};

/// Ordered, duplicate-free set of entity ids, fixed for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePool {
    ids: Vec<EntityId>,
    index: HashSet<EntityId>,
}

impl CandidatePool {
    /// Keep first occurrences in input order; empty ids are dropped.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        let mut pool = Self::default();
        for id in ids {
            let id = id.into();
            if !id.is_empty() && pool.index.insert(id.clone()) {
                pool.ids.push(id);
            }
        }
        pool
    }

    /// Pool from a provider listing, in listing order.
    pub fn from_listings(listings: &[MarketListing]) -> Self {
        Self::new(listings.iter().map(|l| l.id.clone()))
    }

    /// Members in insertion order.
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// Constant-time membership check.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Number of distinct members.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Members in insertion order, borrowed.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

/// Entity id -> upper-case ticker. Entries without a symbol are skipped.
pub fn ticker_map(listings: &[MarketListing]) -> BTreeMap<EntityId, String> {
    let mut map = BTreeMap::new();
    for l in listings {
        let symbol = l.symbol.trim();
        if !symbol.is_empty() {
            map.entry(l.id.clone()).or_insert_with(|| symbol.to_uppercase());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, symbol: &str) -> MarketListing {
        MarketListing {
            id: id.into(),
            symbol: symbol.into(),
            name: String::new(),
            market_cap: None,
            market_cap_rank: None,
        }
    }

    #[test]
    fn dedups_preserving_order() {
        let pool = CandidatePool::new(["b", "a", "b", "", "c"]);
        assert_eq!(pool.ids(), &["b", "a", "c"]);
        assert!(pool.contains("a"));
        assert!(!pool.contains(""));
    }

    #[test]
    fn ticker_map_uppercases_and_skips_blank() {
        let map = ticker_map(&[listing("bitcoin", "btc"), listing("mystery", " ")]);
        assert_eq!(map.get("bitcoin").map(String::as_str), Some("BTC"));
        assert!(!map.contains_key("mystery"));
    }
}
