//! Persisted form of the tracked transaction set.

use crate::entities::{TransactionObject, TransactionReceipt, TxInfo};
use crate::ledger::{Ledger, LedgerError};
use crate::value_objects::TxHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while encoding or decoding a snapshot blob.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("snapshot breaks ledger invariants: {0}")]
    Invalid(#[from] LedgerError),
}

/// Ledger plus the per-hash caches, as stored under a chain's genesis key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub accounts: Ledger,
    #[serde(default)]
    pub info: BTreeMap<TxHash, TxInfo>,
    #[serde(default)]
    pub objects: BTreeMap<TxHash, TransactionObject>,
    #[serde(default)]
    pub receipts: BTreeMap<TxHash, TransactionReceipt>,
    /// Block number at which each hash entered the ledger.
    #[serde(default)]
    pub first_seen: BTreeMap<TxHash, u64>,
}

impl LedgerSnapshot {
    /// Serializes the snapshot to its JSON blob.
    ///
    /// # Errors
    /// Returns `SnapshotError::Encode` if serialization fails.
    pub fn to_blob(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(SnapshotError::Encode)
    }

    /// Parses and validates a JSON blob.
    ///
    /// # Errors
    /// `Decode` for malformed JSON, `Invalid` if the ledger breaks its
    /// invariants.
    pub fn from_blob(blob: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(blob).map_err(SnapshotError::Decode)?;
        snapshot.accounts.validate()?;
        Ok(snapshot)
    }

    /// Drops every cached entry for `hash`. The ledger is not touched.
    pub fn forget(&mut self, hash: &TxHash) {
        self.info.remove(hash);
        self.objects.remove(hash);
        self.receipts.remove(hash);
        self.first_seen.remove(hash);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.info.is_empty()
            && self.objects.is_empty()
            && self.receipts.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
