//! Live dashboard universe: today's top-N as a one-month snapshot.
//!
//! Fed through the same fetch, merge and write path as the research dataset,
//! so both files share one schema.

use crate::error::PipelineError;
use chrono::NaiveDate;
use cryptonest_core::domain::{month_start, DateRange};
use cryptonest_core::source::MarketListing;
use cryptonest_core::universe::{CandidatePool, UniverseSnapshot};

/// The first `size` distinct listings, as members of `today`'s month.
pub fn dashboard_snapshot(
    listings: &[MarketListing],
    size: usize,
    today: NaiveDate,
) -> Result<UniverseSnapshot, PipelineError> {
    let pool = CandidatePool::from_listings(listings);
    let ids = pool.ids().iter().take(size).cloned().collect();
    Ok(UniverseSnapshot::single_month(month_start(today), ids)?)
}

/// Month-to-date.
pub fn dashboard_range(today: NaiveDate) -> DateRange {
    DateRange::new(month_start(today), today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str) -> MarketListing {
        MarketListing {
            id: id.into(),
            symbol: id.into(),
            name: id.into(),
            market_cap: None,
            market_cap_rank: None,
        }
    }

    #[test]
    fn takes_top_n_into_current_month() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 18).unwrap();
        let listings = [listing("bitcoin"), listing("ethereum"), listing("bitcoin"), listing("tether")];
        let snap = dashboard_snapshot(&listings, 2, today).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(today).unwrap(), &["bitcoin", "ethereum"]);

        let range = dashboard_range(today);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(range.end, today);
    }
}
