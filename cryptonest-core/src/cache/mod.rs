//! Content-addressed fetch cache.

pub mod entry;
pub mod gcs;
pub mod key;
pub mod local;
pub mod manager;
pub mod memory;
pub mod retry;
pub mod store;
pub mod tiered;

pub use entry::CacheEntry;
pub use gcs::GcsStore;
pub use key::{CacheKey, CacheKeyBuilder};
pub use local::LocalDirStore;
pub use manager::{CacheError, CacheManager, CacheStats, Lookup, StoreFailurePolicy, StoreOp};
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
pub use store::{CacheStore, StoreError};
pub use tiered::TieredStore;
