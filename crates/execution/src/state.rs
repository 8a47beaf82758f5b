//! Mutable tracker state and its published read-only view.

use serde::Serialize;
use std::collections::BTreeMap;
use txmirror_domain::{
    Address, BlockHash, ChainPointer, Ledger, LedgerSnapshot, TransactionObject,
    TransactionReceipt, TxHash, TxInfo, TxRecord, TxState,
};

/// State guarded by the tracker's state lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct TrackerState {
    pub tracked: LedgerSnapshot,
    pub pointer: ChainPointer,
    pub error: Option<String>,
    pub revision: u64,
}

impl TrackerState {
    pub fn new(tracked: LedgerSnapshot, pointer: ChainPointer) -> Self {
        Self {
            tracked,
            pointer,
            error: None,
            revision: 0,
        }
    }

    /// Records `err` as the last error.
    pub fn record_error(&mut self, err: impl ToString) {
        self.error = Some(err.to_string());
    }

    pub fn view(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            genesis: self.pointer.genesis,
            accounts: self.tracked.accounts.clone(),
            info: self.tracked.info.clone(),
            objects: self.tracked.objects.clone(),
            receipts: self.tracked.receipts.clone(),
            block_number: self.pointer.block_number,
            block_hash: self.pointer.block_hash,
            timestamp: self.pointer.timestamp,
            last_fork: self.pointer.last_fork_block_number,
            revision: self.revision,
            error: self.error.clone(),
        }
    }
}

/// Consistent view of the tracker after one published revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub genesis: BlockHash,
    pub accounts: Ledger,
    pub info: BTreeMap<TxHash, TxInfo>,
    pub objects: BTreeMap<TxHash, TransactionObject>,
    pub receipts: BTreeMap<TxHash, TransactionReceipt>,
    pub block_number: u64,
    pub block_hash: Option<BlockHash>,
    pub timestamp: u64,
    /// Block number of the most recent fork.
    pub last_fork: u64,
    pub revision: u64,
    /// Most recent recorded error.
    pub error: Option<String>,
}

impl TrackerSnapshot {
    /// Hashes in `state` across all accounts, ordered by account then nonce.
    #[must_use]
    pub fn hashes(&self, state: TxState) -> Vec<TxHash> {
        self.accounts.hashes_in(&[state])
    }

    /// Records of one account in the given states.
    #[must_use]
    pub fn records(&self, account: &Address, states: &[TxState]) -> Vec<TxRecord> {
        self.accounts.states_of(Some(account), states)
    }

    /// Current state of `hash`, if it holds a slot.
    #[must_use]
    pub fn state_of(&self, hash: &TxHash) -> Option<TxState> {
        let object = self.objects.get(hash)?;
        self.accounts.locate(&object.from, object.nonce, hash)
    }

    /// Returns true if any transaction is still pending, received or dropped.
    #[must_use]
    pub fn has_active(&self) -> bool {
        self.accounts.has_active()
    }
}
