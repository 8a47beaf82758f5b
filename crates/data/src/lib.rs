//! Persistence backends for tracker snapshots.
//!
//! Every backend implements [`SnapshotStore`], a string key-value store keyed
//! by a chain's genesis hash:
//! - `MemoryStore` for tests and ephemeral trackers
//! - `FileStore` with one JSON file per chain
//! - `PgSnapshotStore` backed by PostgreSQL

/// Store error types.
pub mod error;
/// Store implementations.
pub mod repositories;

pub use error::{StoreError, StoreResult};
pub use repositories::{
    Database, FileStore, MemoryStore, PgSnapshotStore, SnapshotRecord, SnapshotStore,
};
