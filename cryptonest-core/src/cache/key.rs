//! Deterministic, content-addressed cache keys.
//!
//! Layout: `{source}/{entity_slug}/{digest}.json`
//!
//! The digest is BLAKE3 over the canonical JSON of (source, entity, params),
//! with params held in a `BTreeMap` so key order never depends on insertion
//! order. The readable prefix only aids browsing the bucket; identity comes
//! from the digest, so two entities whose slugs sanitize to the same text
//! still get distinct keys.

use crate::domain::DateRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const MAX_SLUG_LEN: usize = 64;

/// A cache key. Identical logical requests produce identical keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start building a key for `entity` from `source`.
    pub fn builder(source: impl Into<String>, entity: impl Into<String>) -> CacheKeyBuilder {
        CacheKeyBuilder {
            source: source.into(),
            entity: entity.into(),
            params: BTreeMap::new(),
        }
    }

    /// Key for a whole-provider artifact with no entity (e.g. a lookup map).
    pub fn named(namespace: &str, name: &str) -> Self {
        Self::builder(namespace, name).build()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments of the key, for stores that map keys onto directories.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates request parameters before producing a [`CacheKey`].
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    source: String,
    entity: String,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (k, v) in params {
            self.params.insert(k.into(), v.to_string());
        }
        self
    }

    pub fn range(self, range: &DateRange) -> Self {
        self.param("start", range.start).param("end", range.end)
    }

    pub fn build(self) -> CacheKey {
        let canonical = serde_json::json!({
            "source": &self.source,
            "entity": &self.entity,
            "params": &self.params,
        });
        let digest = blake3::hash(canonical.to_string().as_bytes()).to_hex();
        CacheKey(format!(
            "{}/{}/{}.json",
            slug(&self.source),
            slug(&self.entity),
            digest
        ))
    }
}

/// Reduce an identifier to `[a-z0-9._-]`, bounded length, never empty and
/// never a relative path component.
fn slug(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect();
    if out.is_empty() || out.chars().all(|c| c == '.') {
        out = "_".into();
    }
    out
}
