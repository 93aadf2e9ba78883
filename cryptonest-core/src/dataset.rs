//! Merged dataset as a Polars frame and Parquet file.
//!
//! The column set and types are fixed: the research and dashboard datasets
//! are written through the same path and always share this schema, even
//! when empty.

use crate::merge::MergedRecord;
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Column order of the dataset file.
pub const COLUMNS: [&str; 17] = [
    "date",
    "coin_id",
    "ticker",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "market_cap",
    "chain_tvl",
    "protocol_tvl",
    "dex_volume",
    "lc_galaxy_score",
    "lc_alt_rank",
    "lc_social_dominance",
    "lc_sentiment",
    "canonical_id",
];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet: {0}")]
    Parquet(String),

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("null {column} at row {row}")]
    NullKey { column: &'static str, row: usize },
}

/// Expected schema of the merged dataset.
pub struct DatasetSchema;

impl DatasetSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(COLUMNS.iter().map(|name| {
            let dtype = match *name {
                "date" => DataType::Date,
                "coin_id" | "ticker" | "canonical_id" => DataType::String,
                _ => DataType::Float64,
            };
            Field::new((*name).into(), dtype)
        }))
    }

    pub fn validate(df: &DataFrame) -> Result<(), DatasetError> {
        let actual = df.schema();
        for field in Self::schema().iter_fields() {
            let dtype = actual
                .get(field.name())
                .ok_or_else(|| DatasetError::MissingColumn(field.name().to_string()))?;
            if dtype != field.dtype() {
                return Err(DatasetError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: dtype.clone(),
                });
            }
        }
        Ok(())
    }
}

/// 1970-01-01; Polars stores dates as days since then.
fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn float_column(name: &str, records: &[MergedRecord], f: impl Fn(&MergedRecord) -> Option<f64>) -> Column {
    Column::new(name.into(), records.iter().map(f).collect::<Vec<Option<f64>>>())
}

pub fn records_to_dataframe(records: &[MergedRecord]) -> Result<DataFrame, DatasetError> {
    let parquet_err = |what: &str, e: PolarsError| DatasetError::Parquet(format!("{what}: {e}"));
    let days: Vec<i32> = records
        .iter()
        .map(|r| (r.date - epoch()).num_days() as i32)
        .collect();

    let df = DataFrame::new(vec![
        Column::new("date".into(), days)
            .cast(&DataType::Date)
            .map_err(|e| parquet_err("date cast", e))?,
        Column::new("coin_id".into(), records.iter().map(|r| r.coin_id.clone()).collect::<Vec<String>>()),
        Column::new("ticker".into(), records.iter().map(|r| r.ticker.clone()).collect::<Vec<Option<String>>>()),
        float_column("open", records, |r| r.open),
        float_column("high", records, |r| r.high),
        float_column("low", records, |r| r.low),
        float_column("close", records, |r| r.close),
        float_column("volume", records, |r| r.volume),
        float_column("market_cap", records, |r| r.market_cap),
        float_column("chain_tvl", records, |r| r.chain_tvl),
        float_column("protocol_tvl", records, |r| r.protocol_tvl),
        float_column("dex_volume", records, |r| r.dex_volume),
        float_column("lc_galaxy_score", records, |r| r.lc_galaxy_score),
        float_column("lc_alt_rank", records, |r| r.lc_alt_rank),
        float_column("lc_social_dominance", records, |r| r.lc_social_dominance),
        float_column("lc_sentiment", records, |r| r.lc_sentiment),
        Column::new(
            "canonical_id".into(),
            records.iter().map(|r| r.canonical_id.clone()).collect::<Vec<String>>(),
        ),
    ])
    .map_err(|e| parquet_err("dataframe creation", e))?;
    Ok(df)
}

pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<MergedRecord>, DatasetError> {
    DatasetSchema::validate(df)?;
    let col_err = |e: PolarsError| DatasetError::Parquet(format!("column read: {e}"));

    let dates = df.column("date").map_err(col_err)?.date().map_err(col_err)?;
    let coin_ids = df.column("coin_id").map_err(col_err)?.str().map_err(col_err)?;
    let tickers = df.column("ticker").map_err(col_err)?.str().map_err(col_err)?;
    let canonical = df.column("canonical_id").map_err(col_err)?.str().map_err(col_err)?;
    let float = |name: &str| -> Result<Float64Chunked, DatasetError> {
        Ok(df.column(name).map_err(col_err)?.f64().map_err(col_err)?.clone())
    };
    let [open, high, low, close, volume, market_cap, chain_tvl, protocol_tvl, dex_volume, galaxy, alt_rank, dominance, sentiment] = [
        "open",
        "high",
        "low",
        "close",
        "volume",
        "market_cap",
        "chain_tvl",
        "protocol_tvl",
        "dex_volume",
        "lc_galaxy_score",
        "lc_alt_rank",
        "lc_social_dominance",
        "lc_sentiment",
    ]
    .map(float);
    let (open, high, low, close) = (open?, high?, low?, close?);
    let (volume, market_cap, chain_tvl, protocol_tvl, dex_volume) =
        (volume?, market_cap?, chain_tvl?, protocol_tvl?, dex_volume?);
    let (galaxy, alt_rank, dominance, sentiment) = (galaxy?, alt_rank?, dominance?, sentiment?);

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let days = dates.get(row).ok_or(DatasetError::NullKey { column: "date", row })?;
        records.push(MergedRecord {
            date: epoch() + chrono::Duration::days(days as i64),
            coin_id: coin_ids
                .get(row)
                .ok_or(DatasetError::NullKey { column: "coin_id", row })?
                .to_string(),
            ticker: tickers.get(row).map(str::to_string),
            open: open.get(row),
            high: high.get(row),
            low: low.get(row),
            close: close.get(row),
            volume: volume.get(row),
            market_cap: market_cap.get(row),
            chain_tvl: chain_tvl.get(row),
            protocol_tvl: protocol_tvl.get(row),
            dex_volume: dex_volume.get(row),
            lc_galaxy_score: galaxy.get(row),
            lc_alt_rank: alt_rank.get(row),
            lc_social_dominance: dominance.get(row),
            lc_sentiment: sentiment.get(row),
            canonical_id: canonical
                .get(row)
                .ok_or(DatasetError::NullKey { column: "canonical_id", row })?
                .to_string(),
        });
    }
    Ok(records)
}

/// Write `records` to `path` atomically (temp file, then rename). Returns the
/// number of rows written.
pub fn write_parquet(records: &[MergedRecord], path: &Path) -> Result<usize, DatasetError> {
    let mut df = records_to_dataframe(records)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp)?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| DatasetError::Parquet(format!("write parquet: {e}")))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        e
    })?;
    Ok(df.height())
}

pub fn read_dataframe(path: &Path) -> Result<DataFrame, DatasetError> {
    let file = fs::File::open(path)?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DatasetError::Parquet(format!("read: {e}")))?;
    DatasetSchema::validate(&df)?;
    Ok(df)
}

pub fn read_parquet(path: &Path) -> Result<Vec<MergedRecord>, DatasetError> {
    dataframe_to_records(&read_dataframe(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("cryptonest_dataset_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record(id: &str, day: u32, close: Option<f64>) -> MergedRecord {
        MergedRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            coin_id: id.into(),
            ticker: None,
            open: None,
            high: None,
            low: None,
            close,
            volume: Some(10.0),
            market_cap: None,
            chain_tvl: None,
            protocol_tvl: None,
            dex_volume: None,
            lc_galaxy_score: None,
            lc_alt_rank: None,
            lc_social_dominance: None,
            lc_sentiment: Some(0.0),
            canonical_id: id.into(),
        }
    }

    #[test]
    fn frame_matches_schema_even_when_empty() {
        let empty = records_to_dataframe(&[]).unwrap();
        DatasetSchema::validate(&empty).unwrap();
        assert_eq!(empty.height(), 0);
        let names: Vec<String> = empty.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, COLUMNS.map(String::from).to_vec());
    }

    #[test]
    fn write_and_read_preserves_nulls_and_zeros() {
        let dir = temp_dir();
        let path = dir.join("out").join("dataset.parquet");
        let rows = vec![record("bitcoin", 1, Some(42_000.0)), record("bitcoin", 2, None)];

        assert_eq!(write_parquet(&rows, &path).unwrap(), 2);
        let back = read_parquet(&path).unwrap();
        assert_eq!(back, rows);
        assert_eq!(back[1].close, None);
        assert_eq!(back[1].lc_sentiment, Some(0.0));
        assert!(!path.with_extension("parquet.tmp").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let df = DataFrame::new(vec![Column::new("date".into(), &["2024-01-01"])]).unwrap();
        assert!(matches!(
            DatasetSchema::validate(&df),
            Err(DatasetError::TypeMismatch { .. })
        ));
        let df = DataFrame::new(vec![Column::new("open".into(), &[1.0])]).unwrap();
        assert!(matches!(
            DatasetSchema::validate(&df),
            Err(DatasetError::MissingColumn(_))
        ));
    }
}
