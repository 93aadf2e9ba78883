//! Criterion benchmarks for the reconstruction and merge hot paths.
//!
//! Benchmarks:
//! 1. Universe reconstruction over a 500-coin pool with three years of daily caps
//! 2. Merge of the resulting market rows with identity resolution

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cryptonest_core::domain::{AssetTimeSeries, EntityId};
use cryptonest_core::merge::{merge, IdentityTable, MarketRecord, RecordsBySource};
use cryptonest_core::universe::{reconstruct, CandidatePool};
use std::collections::BTreeMap;

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
}

fn make_series(coins: usize, days: usize) -> (CandidatePool, BTreeMap<EntityId, AssetTimeSeries>) {
    let ids: Vec<EntityId> = (0..coins).map(|i| format!("coin-{i:04}")).collect();
    let series = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let points = (0..days).map(|d| {
                let cap = 1.0e9 / (i + 1) as f64 * (1.0 + (d as f64 * 0.01 + i as f64).sin() * 0.5);
                (start() + Duration::days(d as i64), cap)
            });
            (id.clone(), AssetTimeSeries::from_points(id.clone(), points))
        })
        .collect();
    (CandidatePool::new(ids), series)
}

fn make_market_rows(coins: usize, days: usize) -> RecordsBySource {
    let mut market = Vec::with_capacity(coins * days);
    for i in 0..coins {
        let entity = if i == 0 { "wrapped-bitcoin".to_string() } else { format!("coin-{i:04}") };
        for d in 0..days {
            market.push(MarketRecord {
                date: start() + Duration::days(d as i64),
                entity: entity.clone(),
                ticker: None,
                open: Some(1.0),
                high: Some(2.0),
                low: Some(0.5),
                close: Some(1.5),
                volume: Some(1000.0),
                market_cap: Some(1.0e6),
            });
        }
    }
    RecordsBySource {
        market,
        ..Default::default()
    }
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct");
    for &coins in &[100usize, 500] {
        let (pool, series) = make_series(coins, 3 * 365);
        group.bench_with_input(BenchmarkId::from_parameter(coins), &coins, |b, _| {
            b.iter(|| reconstruct(black_box(&pool), black_box(&series), start(), 200).unwrap())
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let records = make_market_rows(200, 365);
    let identities = IdentityTable::builtin();
    c.bench_function("merge_200x365", |b| {
        b.iter(|| merge(black_box(&records), black_box(&identities)))
    });
}

criterion_group!(benches, bench_reconstruct, bench_merge);
criterion_main!(benches);
