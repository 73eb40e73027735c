//! File-backed persistence (C3, C4, spec §4.3/§4.4/§6): atomic write-temp +
//! rename for every record so a crash never leaves a torn file.

pub mod atomic_file;
pub mod journal;
pub mod position_store;
pub mod snapshot_log;
pub mod universe_cache;

pub use journal::OrderJournal;
pub use position_store::PositionStore;
pub use snapshot_log::{EquitySnapshot, SnapshotLog};
pub use universe_cache::UniverseCache;
