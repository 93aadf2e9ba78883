//! Point-in-time universe: month -> ordered top-N entity ids.
//!
//! Persisted as a JSON object keyed `YYYY-MM-01` with ordered id arrays. The
//! file format is stable: it is read by other tools.

use crate::domain::{month_start, EntityId};
use chrono::NaiveDate;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MONTH_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("universe file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("universe JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("month key '{0}' is not a YYYY-MM-01 date")]
    InvalidMonth(String),

    #[error("entity '{entity}' listed twice in {month}")]
    DuplicateEntity { month: NaiveDate, entity: EntityId },
}

/// Month (first day) -> members in rank order.
///
/// Months are kept sorted; a month absent from the map has no members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniverseSnapshot {
    months: BTreeMap<NaiveDate, Vec<EntityId>>,
}

impl UniverseSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot holding one month, used for the live dashboard universe.
    pub fn single_month(month: NaiveDate, ids: Vec<EntityId>) -> Result<Self, SnapshotError> {
        let mut snapshot = Self::new();
        snapshot.insert(month, ids)?;
        Ok(snapshot)
    }

    /// Set the members of `month` (normalized to its first day). Rejects
    /// repeated ids within the month.
    pub fn insert(&mut self, month: NaiveDate, ids: Vec<EntityId>) -> Result<(), SnapshotError> {
        let month = month_start(month);
        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(id.as_str()) {
                return Err(SnapshotError::DuplicateEntity {
                    month,
                    entity: id.clone(),
                });
            }
        }
        self.months.insert(month, ids);
        Ok(())
    }

    /// `(month, members)` pairs in month order.
    pub fn months(&self) -> impl Iterator<Item = (NaiveDate, &[EntityId])> {
        self.months.iter().map(|(m, ids)| (*m, ids.as_slice()))
    }

    /// Members of the month containing `month`, if that month is present.
    pub fn get(&self, month: NaiveDate) -> Option<&[EntityId]> {
        self.months.get(&month_start(month)).map(Vec::as_slice)
    }

    /// Number of months.
    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    /// Earliest month, if any.
    pub fn first_month(&self) -> Option<NaiveDate> {
        self.months.keys().next().copied()
    }

    /// Latest month, if any.
    pub fn last_month(&self) -> Option<NaiveDate> {
        self.months.keys().next_back().copied()
    }

    /// Every entity that was a member in at least one month, sorted.
    pub fn unique_entities(&self) -> BTreeSet<EntityId> {
        self.months.values().flatten().cloned().collect()
    }

    /// Whether `entity` was a member in the month containing `date`.
    pub fn is_member(&self, entity: &str, date: NaiveDate) -> bool {
        self.get(date)
            .is_some_and(|ids| ids.iter().any(|id| id == entity))
    }

    /// Entity -> months of membership, for bulk membership checks.
    pub fn membership(&self) -> BTreeMap<EntityId, BTreeSet<NaiveDate>> {
        let mut out: BTreeMap<EntityId, BTreeSet<NaiveDate>> = BTreeMap::new();
        for (month, ids) in &self.months {
            for id in ids {
                out.entry(id.clone()).or_default().insert(*month);
            }
        }
        out
    }

    /// Pretty-printed `{"YYYY-MM-01": [ids...]}` document.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document written by [`to_json`](Self::to_json). Month keys
    /// must be first-of-month dates.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write atomically: a sibling temp file is renamed over `path`.
    /// Parent directories are created.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let io_err = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, self.to_json()?).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }

    /// Read a snapshot file written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

fn parse_month(key: &str) -> Result<NaiveDate, SnapshotError> {
    match NaiveDate::parse_from_str(key, MONTH_KEY_FORMAT) {
        Ok(date) if date == month_start(date) => Ok(date),
        _ => Err(SnapshotError::InvalidMonth(key.to_string())),
    }
}

impl Serialize for UniverseSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let keyed: BTreeMap<String, &Vec<EntityId>> = self
            .months
            .iter()
            .map(|(m, ids)| (m.format(MONTH_KEY_FORMAT).to_string(), ids))
            .collect();
        keyed.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UniverseSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let keyed = BTreeMap::<String, Vec<EntityId>>::deserialize(deserializer)?;
        let mut snapshot = UniverseSnapshot::new();
        for (key, ids) in keyed {
            let month = parse_month(&key).map_err(D::Error::custom)?;
            snapshot.insert(month, ids).map_err(D::Error::custom)?;
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ids(v: &[&str]) -> Vec<EntityId> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn json_uses_first_of_month_keys_and_preserves_order() {
        let mut s = UniverseSnapshot::new();
        s.insert(d("2022-02-17"), ids(&["ethereum", "bitcoin"])).unwrap();
        s.insert(d("2022-01-01"), ids(&["bitcoin"])).unwrap();

        let json = s.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["2022-02-01"], serde_json::json!(["ethereum", "bitcoin"]));
        assert!(json.find("2022-01-01").unwrap() < json.find("2022-02-01").unwrap());

        assert_eq!(UniverseSnapshot::from_json(&json).unwrap(), s);
    }

    #[test]
    fn rejects_mid_month_keys_and_duplicates() {
        assert!(UniverseSnapshot::from_json(r#"{"2022-01-15": ["a"]}"#).is_err());
        assert!(UniverseSnapshot::from_json(r#"{"January": ["a"]}"#).is_err());
        assert!(UniverseSnapshot::from_json(r#"{"2022-01-01": ["a", "a"]}"#).is_err());
        assert!(UniverseSnapshot::from_json(r#"{"2022-01-01": []}"#).unwrap().get(d("2022-01-01")).unwrap().is_empty());
    }

    #[test]
    fn membership_queries() {
        let mut s = UniverseSnapshot::new();
        s.insert(d("2022-01-01"), ids(&["a", "b"])).unwrap();
        s.insert(d("2022-02-01"), ids(&["b", "c"])).unwrap();

        assert!(s.is_member("a", d("2022-01-31")));
        assert!(!s.is_member("a", d("2022-02-01")));
        assert!(!s.is_member("b", d("2022-03-01")));
        assert_eq!(s.unique_entities().into_iter().collect::<Vec<_>>(), ids(&["a", "b", "c"]));
        assert_eq!(s.membership()["b"].len(), 2);
        assert_eq!(s.first_month(), Some(d("2022-01-01")));
        assert_eq!(s.last_month(), Some(d("2022-02-01")));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("universe.json");
        let s = UniverseSnapshot::single_month(d("2024-05-01"), ids(&["x", "y"])).unwrap();
        s.save(&path).unwrap();
        assert_eq!(UniverseSnapshot::load(&path).unwrap(), s);
        assert!(matches!(
            UniverseSnapshot::load(&dir.path().join("missing.json")),
            Err(SnapshotError::Io { .. })
        ));
    }
}
