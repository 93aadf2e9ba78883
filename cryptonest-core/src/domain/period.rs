//! Calendar helpers: month buckets and inclusive date ranges.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month after the one containing `date`.
pub fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Every month start from `first` through `last` inclusive (both normalized).
pub fn months_between(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut cursor = month_start(first);
    let end = month_start(last);
    while cursor <= end {
        months.push(cursor);
        cursor = next_month(cursor);
    }
    months
}

/// Inclusive date range used as a fetch parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Unix seconds at 00:00:00 UTC of the start day.
    pub fn start_timestamp(&self) -> i64 {
        self.start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default()
    }

    /// Unix seconds at 23:59:59 UTC of the end day.
    pub fn end_timestamp(&self) -> i64 {
        self.end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Normalize a provider timestamp (unix milliseconds) to a UTC calendar date.
pub fn date_from_millis(ms: i64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc().date())
}

/// Normalize a provider timestamp (unix seconds) to a UTC calendar date.
pub fn date_from_secs(secs: i64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc().date())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn month_start_and_rollover() {
        assert_eq!(month_start(d("2024-02-29")), d("2024-02-01"));
        assert_eq!(next_month(d("2024-12-15")), d("2025-01-01"));
        assert_eq!(next_month(d("2024-01-31")), d("2024-02-01"));
    }

    #[test]
    fn months_between_is_inclusive() {
        let months = months_between(d("2023-11-20"), d("2024-02-03"));
        assert_eq!(
            months,
            vec![d("2023-11-01"), d("2023-12-01"), d("2024-01-01"), d("2024-02-01")]
        );
        assert!(months_between(d("2024-03-01"), d("2024-02-01")).is_empty());
    }

    #[test]
    fn range_orders_bounds() {
        let r = DateRange::new(d("2024-02-01"), d("2024-01-01"));
        assert_eq!(r.start, d("2024-01-01"));
        assert!(r.contains(d("2024-01-15")));
        assert!(!r.contains(d("2024-02-02")));
        assert!(r.start_timestamp() < r.end_timestamp());
    }

    #[test]
    fn timestamps_normalize_to_day() {
        // 2024-01-02T13:00:00Z
        assert_eq!(date_from_millis(1_704_200_400_000), Some(d("2024-01-02")));
        assert_eq!(date_from_secs(1_704_200_400), Some(d("2024-01-02")));
    }
}
