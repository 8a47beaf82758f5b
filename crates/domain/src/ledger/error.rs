use crate::enums::TxState;
use crate::value_objects::TxHash;
use thiserror::Error;

/// Ledger invariant violations.
///
/// These signal a bug in the caller or the engine, never a chain condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A transition was attempted out of `Confirmed` or `Failed`.
    #[error("illegal transition of {hash:#x} out of terminal state {from} into {to}")]
    IllegalTransition {
        hash: TxHash,
        from: TxState,
        to: TxState,
    },

    /// The record does not describe an occupied slot.
    #[error("no {state} slot holds {hash:#x} at nonce {nonce}")]
    SlotNotFound {
        hash: TxHash,
        nonce: u64,
        state: TxState,
    },

    /// A single-hash slot already holds a different transaction.
    #[error("{state} slot at nonce {nonce} already holds {existing:#x}, cannot place {hash:#x}")]
    SlotOccupied {
        hash: TxHash,
        existing: TxHash,
        nonce: u64,
        state: TxState,
    },

    /// The hash already occupies a slot at this nonce.
    #[error("{hash:#x} is already tracked as {state} at nonce {nonce}")]
    DuplicateHash {
        hash: TxHash,
        nonce: u64,
        state: TxState,
    },

    /// Loaded data breaks a structural invariant.
    #[error("malformed ledger: {0}")]
    Malformed(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
