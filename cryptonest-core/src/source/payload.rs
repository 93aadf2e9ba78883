//! Typed building blocks shared by the provider payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One value on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// Collapse intraday points to one per day (last sample of the day wins),
/// drop non-finite values, and return them in date order.
pub fn daily_last<I>(points: I) -> Vec<DatedValue>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (date, value) in points {
        if value.is_finite() {
            by_day.insert(date, value);
        }
    }
    by_day
        .into_iter()
        .map(|(date, value)| DatedValue { date, value })
        .collect()
}

/// Sum values per day, for sources that split one logical total across parts.
pub fn daily_sum<I>(points: I) -> Vec<DatedValue>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (date, value) in points {
        if value.is_finite() {
            *by_day.entry(date).or_insert(0.0) += value;
        }
    }
    by_day
        .into_iter()
        .map(|(date, value)| DatedValue { date, value })
        .collect()
}

/// Lookup from date to value for joining.
pub fn by_date(values: &[DatedValue]) -> BTreeMap<NaiveDate, f64> {
    values.iter().map(|v| (v.date, v.value)).collect()
}

/// Unix timestamps that some endpoints send as strings (`"1609459200"`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnixSeconds(pub i64);

impl<'de> Deserialize<'de> for UnixSeconds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Int(v) => Ok(UnixSeconds(v)),
            Raw::Float(v) if v.is_finite() => Ok(UnixSeconds(v as i64)),
            Raw::Float(v) => Err(serde::de::Error::custom(format!("non-finite timestamp {v}"))),
            Raw::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(UnixSeconds)
                .map_err(|e| serde::de::Error::custom(format!("timestamp '{s}': {e}"))),
        }
    }
}

impl UnixSeconds {
    pub fn date(self) -> Option<NaiveDate> {
        crate::domain::date_from_secs(self.0)
    }
}
