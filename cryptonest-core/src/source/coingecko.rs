//! CoinGecko market provider.
//!
//! Serves the candidate listing used to seed universe reconstruction and the
//! per-coin market series: daily close, volume, market cap and OHLC.

use super::circuit_breaker::CircuitBreaker;
use super::http::{ApiKeyStyle, JsonClient, ProviderSettings};
use super::payload::{by_date, daily_last, DatedValue};
use super::provider::{ProviderError, Source, SourceFetcher};
use crate::domain::{date_from_millis, AssetTimeSeries, DateRange};
use crate::merge::MarketRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const COINGECKO_PRO_URL: &str = "https://pro-api.coingecko.com/api/v3";

/// Maximum page size accepted by `/coins/markets`.
pub const LISTING_PAGE_SIZE: usize = 250;

/// One row of the market-cap-ordered listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListing {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    market_caps: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    total_volumes: Vec<(f64, Option<f64>)>,
}

/// One daily candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
}

/// Market payload for one coin, as stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPayload {
    pub prices: Vec<DatedValue>,
    pub market_caps: Vec<DatedValue>,
    pub volumes: Vec<DatedValue>,
    #[serde(default)]
    pub ohlc: Vec<OhlcBar>,
}

impl MarketPayload {
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty() && self.market_caps.is_empty()
    }

    /// Daily market cap as a validated series.
    pub fn market_cap_series(&self, entity: &str) -> AssetTimeSeries {
        AssetTimeSeries::from_points(entity, self.market_caps.iter().map(|v| (v.date, v.value)))
    }

    /// One record per price day. Volume, market cap and OHLC join by date and
    /// stay `None` where the provider had nothing.
    pub fn to_records(&self, entity: &str, ticker: Option<&str>) -> Vec<MarketRecord> {
        let caps = by_date(&self.market_caps);
        let volumes = by_date(&self.volumes);
        let ohlc: BTreeMap<NaiveDate, &OhlcBar> = self.ohlc.iter().map(|b| (b.date, b)).collect();

        self.prices
            .iter()
            .map(|p| {
                let bar = ohlc.get(&p.date);
                MarketRecord {
                    date: p.date,
                    entity: entity.to_string(),
                    ticker: ticker.map(str::to_string),
                    open: bar.map(|b| b.open),
                    high: bar.map(|b| b.high),
                    low: bar.map(|b| b.low),
                    close: Some(p.value),
                    volume: volumes.get(&p.date).copied(),
                    market_cap: caps.get(&p.date).copied(),
                }
            })
            .collect()
    }
}

fn daily_points(points: Vec<(f64, Option<f64>)>, range: &DateRange) -> Vec<DatedValue> {
    daily_last(points.into_iter().filter_map(|(ts, value)| {
        let date = date_from_millis(ts as i64)?;
        let value = value?;
        range.contains(date).then_some((date, value))
    }))
}

fn daily_bars(raw: Vec<(f64, f64, f64, f64, f64)>, range: &DateRange) -> Vec<OhlcBar> {
    let mut by_day = BTreeMap::new();
    for (ts, open, high, low, _close) in raw {
        let Some(date) = date_from_millis(ts as i64) else {
            continue;
        };
        if range.contains(date) && open.is_finite() && high.is_finite() && low.is_finite() {
            by_day.insert(date, OhlcBar { date, open, high, low });
        }
    }
    by_day.into_values().collect()
}

pub struct CoinGeckoClient {
    http: JsonClient,
}

impl CoinGeckoClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let provider = Source::Market.provider();
        let http = JsonClient::new(
            provider,
            settings,
            ApiKeyStyle::Header("x-cg-pro-api-key"),
            Arc::new(CircuitBreaker::for_provider(provider)),
        )?;
        Ok(Self { http })
    }

    /// The top `count` coins by current market cap, deduplicated by id in
    /// rank order.
    pub fn fetch_listings(&self, count: usize) -> Result<Vec<MarketListing>, ProviderError> {
        let url = self.http.url("/coins/markets");
        let pages = count.div_ceil(LISTING_PAGE_SIZE);
        let mut seen = HashSet::new();
        let mut listings = Vec::with_capacity(count);

        for page in 1..=pages {
            let query = [
                ("vs_currency", "usd".to_string()),
                ("order", "market_cap_desc".to_string()),
                ("per_page", LISTING_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            let batch: Vec<MarketListing> = self.http.get_json(&url, &query, "coins/markets")?;
            let short = batch.len() < LISTING_PAGE_SIZE;
            debug!(page, rows = batch.len(), "fetched listing page");
            listings.extend(batch.into_iter().filter(|l| seen.insert(l.id.clone())));
            if short {
                break;
            }
        }
        listings.truncate(count);
        Ok(listings)
    }

    fn market_chart(&self, entity: &str, range: &DateRange) -> Result<MarketChartResponse, ProviderError> {
        let url = self.http.url(&format!("/coins/{entity}/market_chart/range"));
        let query = [
            ("vs_currency", "usd".to_string()),
            ("from", range.start_timestamp().to_string()),
            ("to", range.end_timestamp().to_string()),
            ("interval", "daily".to_string()),
        ];
        self.http.get_json(&url, &query, entity)
    }

    fn ohlc(&self, entity: &str, range: &DateRange) -> Result<Vec<(f64, f64, f64, f64, f64)>, ProviderError> {
        let url = self.http.url(&format!("/coins/{entity}/ohlc/range"));
        let query = [
            ("vs_currency", "usd".to_string()),
            ("from", range.start_timestamp().to_string()),
            ("to", range.end_timestamp().to_string()),
            ("interval", "daily".to_string()),
        ];
        self.http.get_json(&url, &query, entity)
    }
}

impl SourceFetcher for CoinGeckoClient {
    type Payload = MarketPayload;

    fn source(&self) -> Source {
        Source::Market
    }

    fn fetch(&self, entity: &str, range: &DateRange) -> Result<MarketPayload, ProviderError> {
        let chart = self.market_chart(entity, range)?;

        // A coin without candles still has a usable close series. Anything
        // else must fail the whole fetch so nothing partial gets cached.
        let ohlc = match self.ohlc(entity, range) {
            Ok(raw) => daily_bars(raw, range),
            Err(e) if e.is_not_found() => {
                warn!(entity, "no OHLC data");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let payload = MarketPayload {
            prices: daily_points(chart.prices, range),
            market_caps: daily_points(chart.market_caps, range),
            volumes: daily_points(chart.total_volumes, range),
            ohlc,
        };
        if payload.is_empty() {
            return Err(ProviderError::NotFound {
                provider: self.http.provider().into(),
                entity: entity.into(),
            });
        }
        debug!(entity, days = payload.prices.len(), "fetched market series");
        Ok(payload)
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_market_chart_and_keeps_last_sample_per_day() {
        let json = r#"{
            "prices": [[1704067200000, 42000.0], [1704110400000, 42500.5], [1704153600000, 43000.0]],
            "market_caps": [[1704067200000, 8.2e11], [1704153600000, null]],
            "total_volumes": [[1704067200000, 1.5e10]]
        }"#;
        let raw: MarketChartResponse = serde_json::from_str(json).unwrap();
        let range = DateRange::new(d("2024-01-01"), d("2024-01-31"));

        let prices = daily_points(raw.prices, &range);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].value, 42500.5);
        assert_eq!(prices[1].date, d("2024-01-02"));

        let caps = daily_points(raw.market_caps, &range);
        assert_eq!(caps.len(), 1, "null values are dropped");
    }

    #[test]
    fn points_outside_range_are_dropped() {
        let range = DateRange::new(d("2024-01-02"), d("2024-01-02"));
        let pts = daily_points(vec![(1704067200000.0, Some(1.0)), (1704153600000.0, Some(2.0))], &range);
        assert_eq!(pts, vec![DatedValue { date: d("2024-01-02"), value: 2.0 }]);
    }

    #[test]
    fn records_anchor_on_price_days() {
        let payload = MarketPayload {
            prices: vec![
                DatedValue { date: d("2024-01-01"), value: 10.0 },
                DatedValue { date: d("2024-01-02"), value: 11.0 },
            ],
            market_caps: vec![DatedValue { date: d("2024-01-02"), value: 500.0 }],
            volumes: vec![DatedValue { date: d("2024-01-05"), value: 7.0 }],
            ohlc: vec![OhlcBar { date: d("2024-01-01"), open: 9.0, high: 12.0, low: 8.5 }],
        };
        let rows = payload.to_records("demo", Some("DMO"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].open, Some(9.0));
        assert_eq!(rows[0].market_cap, None);
        assert_eq!(rows[1].market_cap, Some(500.0));
        assert_eq!(rows[1].open, None);
        assert!(rows.iter().all(|r| r.volume.is_none()));
        assert_eq!(rows[1].ticker.as_deref(), Some("DMO"));
        assert_eq!(rows[1].close, Some(11.0));
    }

    #[test]
    fn listing_tolerates_missing_fields() {
        let json = r#"[{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "market_cap": 1.0e12, "market_cap_rank": 1},
                       {"id": "obscure", "market_cap": null}]"#;
        let rows: Vec<MarketListing> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[1].market_cap, None);
        assert_eq!(rows[1].symbol, "");
    }

    #[test]
    fn market_cap_series_is_ordered() {
        let payload = MarketPayload {
            market_caps: vec![
                DatedValue { date: d("2024-01-01"), value: 1.0 },
                DatedValue { date: d("2024-01-02"), value: 2.0 },
            ],
            ..Default::default()
        };
        let s = payload.market_cap_series("x");
        assert_eq!(s.len(), 2);
        assert_eq!(s.last_date(), Some(d("2024-01-02")));
    }
}
