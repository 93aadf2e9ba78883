//! Universe reconstruction: monthly market-cap ranking over a candidate pool.
//!
//! Each month's ranking only sees observations dated inside that month, so a
//! snapshot never leaks later information into an earlier month. Entities
//! without observations in a month are absent from it, not ranked as zero.

use super::pool::CandidatePool;
use super::snapshot::{SnapshotError, UniverseSnapshot};
use crate::domain::{month_start, months_between, AssetTimeSeries, EntityId};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One entity's standing in one month.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntity {
    pub id: EntityId,
    pub avg_market_cap: f64,
    pub observations: usize,
}

/// The full pool ranking for one month, before truncation to the universe size.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRanking {
    pub month: NaiveDate,
    pub entries: Vec<RankedEntity>,
}

impl MonthlyRanking {
    pub fn top(&self, n: usize) -> Vec<EntityId> {
        self.entries.iter().take(n).map(|e| e.id.clone()).collect()
    }
}

/// Descending average, ties by id ascending.
fn rank_order(a: &RankedEntity, b: &RankedEntity) -> Ordering {
    b.avg_market_cap
        .total_cmp(&a.avg_market_cap)
        .then_with(|| a.id.cmp(&b.id))
}

/// Per-month (sum, count) of an entity's observations on or after `start`.
fn monthly_totals(series: &AssetTimeSeries, start: NaiveDate) -> BTreeMap<NaiveDate, (f64, usize)> {
    let mut totals: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for obs in series.observations().iter().filter(|o| o.date >= start) {
        let slot = totals.entry(month_start(obs.date)).or_insert((0.0, 0));
        slot.0 += obs.market_cap;
        slot.1 += 1;
    }
    totals
}

/// Rank every pool member with data in each month from `start_month` to the
/// latest month any pool member has data for.
///
/// Series for entities outside the pool are ignored. Months in that span with
/// no data at all produce an empty ranking.
pub fn rank_months(
    pool: &CandidatePool,
    series_by_entity: &BTreeMap<EntityId, AssetTimeSeries>,
    start_month: NaiveDate,
) -> Vec<MonthlyRanking> {
    let start = month_start(start_month);
    let mut by_month: BTreeMap<NaiveDate, Vec<RankedEntity>> = BTreeMap::new();

    for id in pool.iter() {
        let Some(series) = series_by_entity.get(id) else {
            debug!(entity = id, "no market-cap series, excluded from ranking");
            continue;
        };
        for (month, (sum, count)) in monthly_totals(series, start) {
            by_month.entry(month).or_default().push(RankedEntity {
                id: id.to_string(),
                avg_market_cap: sum / count as f64,
                observations: count,
            });
        }
    }

    let Some(last) = by_month.keys().next_back().copied() else {
        return Vec::new();
    };

    months_between(start, last)
        .into_iter()
        .map(|month| {
            let mut entries = by_month.remove(&month).unwrap_or_default();
            entries.sort_by(rank_order);
            MonthlyRanking { month, entries }
        })
        .collect()
}

/// Month -> top `universe_size` ids. Short months stay short.
pub fn reconstruct(
    pool: &CandidatePool,
    series_by_entity: &BTreeMap<EntityId, AssetTimeSeries>,
    start_month: NaiveDate,
    universe_size: usize,
) -> Result<UniverseSnapshot, SnapshotError> {
    let mut snapshot = UniverseSnapshot::new();
    for ranking in rank_months(pool, series_by_entity, start_month) {
        snapshot.insert(ranking.month, ranking.top(universe_size))?;
    }
    info!(
        months = snapshot.len(),
        entities = snapshot.unique_entities().len(),
        universe_size,
        "reconstructed universe"
    );
    Ok(snapshot)
}

/// Reconstruction parameters bound once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniverseReconstructor {
    start_month: NaiveDate,
    universe_size: usize,
}

impl UniverseReconstructor {
    pub fn new(start_month: NaiveDate, universe_size: usize) -> Self {
        Self {
            start_month: month_start(start_month),
            universe_size,
        }
    }

    pub fn start_month(&self) -> NaiveDate {
        self.start_month
    }

    pub fn universe_size(&self) -> usize {
        self.universe_size
    }

    pub fn reconstruct(
        &self,
        pool: &CandidatePool,
        series_by_entity: &BTreeMap<EntityId, AssetTimeSeries>,
    ) -> Result<UniverseSnapshot, SnapshotError> {
        reconstruct(pool, series_by_entity, self.start_month, self.universe_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn series(id: &str, points: &[(&str, f64)]) -> (EntityId, AssetTimeSeries) {
        (
            id.to_string(),
            AssetTimeSeries::from_points(id, points.iter().map(|(s, v)| (d(s), *v))),
        )
    }

    #[test]
    fn top_n_with_tie_and_missing_entity() {
        let pool = CandidatePool::new(["D", "C", "B", "A"]);
        let data: BTreeMap<_, _> = [
            series("A", &[("2024-01-10", 100.0)]),
            series("B", &[("2024-01-10", 90.0)]),
            series("C", &[("2024-01-10", 90.0)]),
        ]
        .into_iter()
        .collect();

        let snap = reconstruct(&pool, &data, d("2024-01-01"), 2).unwrap();
        assert_eq!(snap.get(d("2024-01-01")).unwrap(), &["A", "B"]);
    }

    #[test]
    fn months_average_and_absence() {
        let pool = CandidatePool::new(["x", "y"]);
        let data: BTreeMap<_, _> = [
            series("x", &[("2024-01-01", 10.0), ("2024-01-31", 30.0), ("2024-03-05", 1.0)]),
            series("y", &[("2024-01-15", 15.0), ("2024-03-05", 5.0)]),
        ]
        .into_iter()
        .collect();

        let rankings = rank_months(&pool, &data, d("2024-01-01"));
        assert_eq!(rankings.len(), 3, "gap month is still emitted");
        assert_eq!(rankings[0].entries[0].id, "x");
        assert_eq!(rankings[0].entries[0].avg_market_cap, 20.0);
        assert_eq!(rankings[0].entries[0].observations, 2);
        assert!(rankings[1].entries.is_empty());
        assert_eq!(rankings[2].top(5), vec!["y".to_string(), "x".to_string()]);
    }

    #[test]
    fn observations_before_start_are_ignored() {
        let pool = CandidatePool::new(["x"]);
        let data: BTreeMap<_, _> = [series("x", &[("2021-12-31", 10.0), ("2022-01-01", 1.0)])]
            .into_iter()
            .collect();
        let snap = reconstruct(&pool, &data, d("2022-01-20"), 10).unwrap();
        assert_eq!(snap.first_month(), Some(d("2022-01-01")));
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn entities_outside_pool_are_ignored() {
        let pool = CandidatePool::new(["x"]);
        let data: BTreeMap<_, _> = [
            series("x", &[("2024-01-01", 1.0)]),
            series("outsider", &[("2024-01-01", 1e12), ("2024-06-01", 1e12)]),
        ]
        .into_iter()
        .collect();
        let snap = reconstruct(&pool, &data, d("2024-01-01"), 10).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(d("2024-01-01")).unwrap(), &["x"]);
    }

    #[test]
    fn empty_inputs_give_empty_snapshot() {
        let snap = reconstruct(&CandidatePool::default(), &BTreeMap::new(), d("2024-01-01"), 5).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn reconstructor_normalizes_start() {
        let r = UniverseReconstructor::new(d("2022-01-15"), 200);
        assert_eq!(r.start_month(), d("2022-01-01"));
        assert_eq!(r.universe_size(), 200);
    }
}
