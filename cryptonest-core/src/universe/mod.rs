//! Point-in-time universe reconstruction.

pub mod pool;
pub mod reconstruct;
pub mod snapshot;

pub use pool::{ticker_map, CandidatePool};
pub use reconstruct::{
    rank_months, reconstruct, MonthlyRanking, RankedEntity, UniverseReconstructor,
};
pub use snapshot::{SnapshotError, UniverseSnapshot};
