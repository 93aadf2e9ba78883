//! Per-entity market-cap history.

use super::EntityId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One daily market-cap observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub market_cap: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("{entity}: dates must be strictly increasing ({previous} then {next})")]
    NotIncreasing {
        entity: EntityId,
        previous: NaiveDate,
        next: NaiveDate,
    },

    #[error("{entity}: market cap on {date} is not a finite number")]
    NonFinite { entity: EntityId, date: NaiveDate },
}

/// Ordered (date, market cap) observations for one entity.
///
/// Invariant: dates strictly increasing, every value finite. A date with no
/// usable value is simply not present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTimeSeries {
    entity: EntityId,
    observations: Vec<Observation>,
}

impl AssetTimeSeries {
    /// Build from observations that already satisfy the invariant.
    pub fn new(
        entity: impl Into<EntityId>,
        observations: Vec<Observation>,
    ) -> Result<Self, SeriesError> {
        let entity = entity.into();
        for obs in &observations {
            if !obs.market_cap.is_finite() {
                return Err(SeriesError::NonFinite {
                    entity,
                    date: obs.date,
                });
            }
        }
        for pair in observations.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(SeriesError::NotIncreasing {
                    entity,
                    previous: pair[0].date,
                    next: pair[1].date,
                });
            }
        }
        Ok(Self {
            entity,
            observations,
        })
    }

    /// Build from raw provider points: non-finite values are dropped, points
    /// are sorted by date, and for repeated dates the last point wins.
    pub fn from_points(
        entity: impl Into<EntityId>,
        points: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        let mut observations: Vec<Observation> = points
            .into_iter()
            .filter(|(_, cap)| cap.is_finite())
            .map(|(date, market_cap)| Observation { date, market_cap })
            .collect();
        // Stable sort keeps provider order among equal dates, so `last` is the latest sample.
        observations.sort_by_key(|o| o.date);
        let mut deduped: Vec<Observation> = Vec::with_capacity(observations.len());
        for obs in observations {
            match deduped.last_mut() {
                Some(prev) if prev.date == obs.date => *prev = obs,
                _ => deduped.push(obs),
            }
        }
        Self {
            entity: entity.into(),
            observations: deduped,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = AssetTimeSeries::new(
            "bitcoin",
            vec![
                Observation { date: d("2024-01-01"), market_cap: 1.0 },
                Observation { date: d("2024-01-01"), market_cap: 2.0 },
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SeriesError::NotIncreasing { .. }));
    }

    #[test]
    fn rejects_nan() {
        let err = AssetTimeSeries::new(
            "bitcoin",
            vec![Observation { date: d("2024-01-01"), market_cap: f64::NAN }],
        )
        .unwrap_err();
        assert!(matches!(err, SeriesError::NonFinite { .. }));
    }

    #[test]
    fn from_points_sorts_dedupes_and_drops_nan() {
        let s = AssetTimeSeries::from_points(
            "eth",
            vec![
                (d("2024-01-03"), 30.0),
                (d("2024-01-01"), 10.0),
                (d("2024-01-02"), f64::NAN),
                (d("2024-01-03"), 31.0),
            ],
        );
        let dates: Vec<_> = s.observations().iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![d("2024-01-01"), d("2024-01-03")]);
        assert_eq!(s.observations()[1].market_cap, 31.0);
        assert_eq!(s.last_date(), Some(d("2024-01-03")));
    }
}
