//! Static raw-id -> canonical-id table.
//!
//! Wrapped and bridged variants of an asset are folded into the asset itself
//! before the join. Resolution is a single lookup: a canonical id may not
//! itself be an alias.

use crate::domain::EntityId;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BUILTIN: [(&str, &str); 3] = [
    ("binance-peg-weth", "weth"),
    ("wrapped-steth", "staked-ether"),
    ("wrapped-bitcoin", "bitcoin"),
];

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("identity table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("'{raw}' maps to '{canonical}', which is itself an alias")]
    Chained { raw: EntityId, canonical: EntityId },
}

#[derive(Debug, Deserialize)]
struct TableFile {
    #[serde(default)]
    aliases: BTreeMap<EntityId, EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityTable {
    aliases: BTreeMap<EntityId, EntityId>,
}

impl IdentityTable {
    /// Table with no aliases: every id is its own canonical id.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        Self {
            aliases: BUILTIN
                .iter()
                .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
                .collect(),
        }
    }

    pub fn from_aliases(aliases: BTreeMap<EntityId, EntityId>) -> Result<Self, IdentityError> {
        let aliases: BTreeMap<_, _> = aliases.into_iter().filter(|(raw, canonical)| raw != canonical).collect();
        for (raw, canonical) in &aliases {
            if aliases.contains_key(canonical) {
                return Err(IdentityError::Chained {
                    raw: raw.clone(),
                    canonical: canonical.clone(),
                });
            }
        }
        Ok(Self { aliases })
    }

    /// Parse an `[aliases]` table of `"raw-id" = "canonical-id"` pairs.
    pub fn from_toml(text: &str) -> Result<Self, IdentityError> {
        let file: TableFile = toml::from_str(text)?;
        Self::from_aliases(file.aliases)
    }

    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let text = std::fs::read_to_string(path).map_err(|source| IdentityError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn canonical<'a>(&'a self, raw: &'a str) -> &'a str {
        self.aliases.get(raw).map(String::as_str).unwrap_or(raw)
    }

    /// Whether `raw` folds into a different canonical id.
    pub fn is_alias(&self, raw: &str) -> bool {
        self.aliases.contains_key(raw)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// `(raw, canonical)` pairs in raw-id order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(r, c)| (r.as_str(), c.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_folds_wrapped_assets() {
        let t = IdentityTable::builtin();
        assert_eq!(t.canonical("wrapped-bitcoin"), "bitcoin");
        assert_eq!(t.canonical("wrapped-steth"), "staked-ether");
        assert_eq!(t.canonical("bitcoin"), "bitcoin");
        assert_eq!(t.canonical("dogecoin"), "dogecoin");
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn parses_toml_table() {
        let t = IdentityTable::from_toml(
            r#"
            [aliases]
            "wrapped-bitcoin" = "bitcoin"
            "bridged-usdc" = "usd-coin"
            "usd-coin" = "usd-coin"
            "#,
        )
        .unwrap();
        assert_eq!(t.canonical("bridged-usdc"), "usd-coin");
        assert!(!t.is_alias("usd-coin"), "self-maps are dropped");
        assert!(t.is_alias("wrapped-bitcoin"));
        assert_eq!(
            t.aliases().collect::<Vec<_>>(),
            vec![("bridged-usdc", "usd-coin"), ("wrapped-bitcoin", "bitcoin")]
        );
    }

    #[test]
    fn rejects_chains() {
        let err = IdentityTable::from_toml(
            r#"
            [aliases]
            a = "b"
            b = "c"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, IdentityError::Chained { .. }));
    }

    #[test]
    fn missing_section_is_empty() {
        assert!(IdentityTable::from_toml("").unwrap().is_empty());
    }
}
