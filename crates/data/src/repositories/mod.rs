//! Snapshot store implementations.
//!
//! This module provides the store trait the tracker persists through and
//! its in-memory, file and PostgreSQL backends.

mod file_repository;
mod memory_repository;
mod snapshot_repository;

pub use file_repository::FileStore;
pub use memory_repository::MemoryStore;
pub use snapshot_repository::{PgSnapshotStore, SnapshotRecord};

use crate::error::StoreResult;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

/// Key-value store for serialized ledger snapshots.
///
/// Keys are genesis hashes as `0x`-prefixed hex. Values are opaque blobs.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the blob stored under `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `blob` under `key`, replacing any previous value.
    async fn set(&self, key: &str, blob: String) -> StoreResult<()>;

    /// Removes every stored blob.
    async fn clear(&self) -> StoreResult<()>;
}

/// Database connection wrapper for repositories.
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Creates a new Database wrapper from a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Creates a new database connection from a connection string.
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates a PgSnapshotStore instance.
    #[must_use]
    pub fn snapshots(&self) -> PgSnapshotStore {
        PgSnapshotStore::new(self.pool.clone())
    }

    /// Runs database migrations.
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(include_str!("../../migrations/001_initial_schema.sql"))
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
