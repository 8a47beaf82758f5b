use crate::enums::TxState;
use crate::value_objects::{Address, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Transaction as reported by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionObject {
    pub hash: TxHash,
    pub nonce: u64,
    pub from: Address,
}

impl TransactionObject {
    pub fn new(hash: TxHash, nonce: u64, from: Address) -> Self {
        Self { hash, nonce, from }
    }

    /// Record describing where this transaction sits in `state`.
    #[must_use]
    pub fn record(&self, state: TxState) -> TxRecord {
        TxRecord {
            hash: self.hash,
            account: self.from,
            nonce: self.nonce,
            state,
        }
    }
}

/// One occupied (account, state, nonce) slot of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRecord {
    pub hash: TxHash,
    pub account: Address,
    pub nonce: u64,
    pub state: TxState,
}

impl TxRecord {
    /// Same slot coordinates in another state.
    #[must_use]
    pub fn in_state(self, state: TxState) -> Self {
        Self { state, ..self }
    }
}

/// Caller-supplied metadata attached to a transaction hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInfo {
    pub hash: TxHash,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl TxInfo {
    /// Creates info carrying only the hash.
    pub fn new(hash: TxHash) -> Self {
        Self {
            hash,
            metadata: Map::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merges `other`'s metadata into this one; keys in `other` win.
    pub fn merge(&mut self, other: TxInfo) {
        self.metadata.extend(other.metadata);
    }
}
