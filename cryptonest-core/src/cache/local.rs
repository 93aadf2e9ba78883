//! Local directory store.
//!
//! Layout: `{root}/{source}/{entity}/{digest}.json`, mirroring the key.
//! Writes are atomic: write to a unique `.tmp` sibling, then rename into place,
//! so concurrent writers of one key leave one complete payload behind.

use super::key::CacheKey;
use super::store::{CacheStore, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        key.segments().fold(self.root.clone(), |p, seg| p.join(seg))
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            store: self.name().into(),
            source,
        }
    }
}

impl CacheStore for LocalDirStore {
    fn name(&self) -> &str {
        "local"
    }

    fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(self.path_for(key).is_file())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn put(&self, key: &CacheKey, payload: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let id = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("json.{}.{id}.tmp", std::process::id()));
        fs::write(&tmp_path, payload).map_err(|e| self.io_err(e))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            self.io_err(e)
        })
    }
}
