//! Domain model for mirroring blockchain transaction lifecycles.
//!
//! This crate holds the chain-agnostic pieces of the tracker:
//! - Transaction states and their ordering
//! - Chain-reported entities (transaction objects, receipts, blocks)
//! - The per-account, nonce-indexed ledger state machine
//! - The persisted snapshot format

/// Chain-reported and caller-supplied entities.
pub mod entities;
/// Transaction lifecycle states.
pub mod enums;
/// Per-account nonce-indexed state machine.
pub mod ledger;
/// Persisted snapshot of tracked transactions.
pub mod snapshot;
/// Hash and address primitives.
pub mod value_objects;

pub use entities::{
    Block, BlockId, ChainPointer, TransactionObject, TransactionReceipt, TxInfo, TxRecord,
};
pub use enums::TxState;
pub use ledger::{AccountLedger, Ledger, LedgerError, LedgerResult};
pub use snapshot::{LedgerSnapshot, SnapshotError};
pub use value_objects::{Address, BlockHash, TxHash};
