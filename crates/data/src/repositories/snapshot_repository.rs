//! PostgreSQL snapshot store.

use super::SnapshotStore;
use crate::error::StoreResult;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::debug;

/// Database record for a persisted snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    /// Genesis hash of the chain.
    pub genesis: String,
    /// Serialized ledger snapshot.
    pub blob: String,
    /// Last write timestamp.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl SnapshotRecord {
    /// Creates a SnapshotRecord from a database row.
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            genesis: row.try_get("genesis")?,
            blob: row.try_get("blob")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Snapshot store over the `tx_snapshots` table.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: Arc<PgPool>,
}

impl PgSnapshotStore {
    /// Creates a new PgSnapshotStore.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds the stored record for a genesis hash.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find(&self, genesis: &str) -> Result<Option<SnapshotRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM tx_snapshots WHERE genesis = $1")
            .bind(genesis)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.map(|r| SnapshotRecord::from_row(&r)).transpose()
    }

    /// Lists every stored record, most recently written first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_all(&self) -> Result<Vec<SnapshotRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM tx_snapshots ORDER BY updated_at DESC")
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.iter().map(SnapshotRecord::from_row).collect()
    }

    /// Deletes the record for a genesis hash.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn delete(&self, genesis: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tx_snapshots WHERE genesis = $1")
            .bind(genesis)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.find(key).await?.map(|record| record.blob))
    }

    async fn set(&self, key: &str, blob: String) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tx_snapshots (genesis, blob, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (genesis) DO UPDATE SET
                blob = EXCLUDED.blob,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(&blob)
        .execute(self.pool.as_ref())
        .await?;
        debug!(key, bytes = blob.len(), "snapshot upserted");
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM tx_snapshots")
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
