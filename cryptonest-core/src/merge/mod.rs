//! Multi-source merge with canonical identity resolution.

pub mod identity;
pub mod join;
pub mod records;

pub use identity::{IdentityError, IdentityTable};
pub use join::{field_policy, merge, FieldKind, IdentityCollision, MergeOutput, FIELD_POLICIES};
pub use records::{MarketRecord, MergedRecord, OnChainRecord, RecordsBySource, SocialRecord};
