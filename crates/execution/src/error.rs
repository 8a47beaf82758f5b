use serde::Serialize;
use std::fmt;
use thiserror::Error;
use txmirror_data::StoreError;
use txmirror_domain::{BlockId, LedgerError, SnapshotError, TxHash};
use txmirror_protocols::RpcError;

/// Errors returned by tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("persisted snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("block {0} not found")]
    BlockNotFound(BlockId),

    /// The transaction object is not cached yet; reconcile the hash first.
    #[error("transaction {0:#x} has no cached transaction object")]
    UnknownTransaction(TxHash),

    #[error("tracker is shut down")]
    Closed,
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Why a hash could not be ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionErrorKind {
    /// The node does not know a hash the caller asked to track.
    NotFound,
    /// The node does not know a hash that has no caller-supplied Info.
    Unrequested,
}

/// A hash dropped from the ledger because the node does not know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionError {
    pub hash: TxHash,
    pub kind: IngestionErrorKind,
}

impl fmt::Display for IngestionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IngestionErrorKind::NotFound => write!(f, "transaction {:#x} not found", self.hash),
            IngestionErrorKind::Unrequested => {
                write!(f, "untracked transaction {:#x} not found", self.hash)
            }
        }
    }
}
