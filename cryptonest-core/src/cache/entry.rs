//! Stored cache entry envelope.

use super::key::CacheKey;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Envelope format version written into every entry.
pub const ENTRY_FORMAT: u32 = 1;

/// Payload plus the metadata needed to audit where it came from.
///
/// Entries are never mutated in place; a refetch writes a whole new entry
/// under the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub format: u32,
    pub key: String,
    pub fetched_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl CacheEntry {
    pub fn new<T: Serialize>(
        key: &CacheKey,
        fetched_at: DateTime<Utc>,
        payload: &T,
    ) -> Result<Self, String> {
        let payload = serde_json::to_value(payload).map_err(|e| format!("payload encode: {e}"))?;
        Ok(Self {
            format: ENTRY_FORMAT,
            key: key.as_str().to_string(),
            fetched_at,
            payload,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, String> {
        serde_json::to_vec(self).map_err(|e| format!("entry encode: {e}"))
    }

    /// Decode stored bytes, checking the envelope belongs to `key`.
    pub fn decode(key: &CacheKey, bytes: &[u8]) -> Result<Self, String> {
        let entry: CacheEntry =
            serde_json::from_slice(bytes).map_err(|e| format!("entry decode: {e}"))?;
        if entry.format != ENTRY_FORMAT {
            return Err(format!("unsupported entry format {}", entry.format));
        }
        if entry.key != key.as_str() {
            return Err(format!("entry key mismatch: stored '{}'", entry.key));
        }
        Ok(entry)
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(self.payload.clone()).map_err(|e| format!("payload decode: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_rejects_foreign_key() {
        let k1 = CacheKey::named("maps", "a");
        let k2 = CacheKey::named("maps", "b");
        let bytes = CacheEntry::new(&k1, Utc::now(), &vec![1, 2, 3])
            .unwrap()
            .encode()
            .unwrap();
        assert!(CacheEntry::decode(&k1, &bytes).is_ok());
        assert!(CacheEntry::decode(&k2, &bytes)
            .unwrap_err()
            .contains("key mismatch"));
    }

    #[test]
    fn garbage_is_reported() {
        let k = CacheKey::named("maps", "a");
        assert!(CacheEntry::decode(&k, b"{not json").is_err());
    }
}
