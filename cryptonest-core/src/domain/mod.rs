//! Domain types shared by the cache, universe and merge layers.

pub mod period;
pub mod series;

pub use period::{
    date_from_millis, date_from_secs, month_start, months_between, next_month, DateRange,
};
pub use series::{AssetTimeSeries, Observation, SeriesError};

/// Provider-native entity identifier (e.g. a CoinGecko coin id such as `bitcoin`).
pub type EntityId = String;
