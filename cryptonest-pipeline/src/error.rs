use crate::config::ConfigError;
use cryptonest_core::cache::{CacheError, StoreError};
use cryptonest_core::dataset::DatasetError;
use cryptonest_core::merge::IdentityError;
use cryptonest_core::source::ProviderError;
use cryptonest_core::universe::SnapshotError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("cache store setup: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("worker pool: {0}")]
    WorkerPool(String),

    #[error("no data: {0}")]
    NoData(String),
}
