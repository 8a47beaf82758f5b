use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a tracked transaction.
///
/// Two forward orderings exist: `Pending < Received < Confirmed` for a
/// transaction that made it into the canonical chain, and
/// `Pending < Dropped < Failed` for one that was superseded by another
/// transaction at the same or a higher nonce. Only a fork moves a
/// transaction backwards, and only into `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    /// Broadcast, no receipt observed.
    Pending,
    /// Receipt observed, not yet buried under enough blocks.
    Received,
    /// Superseded by a received transaction at a higher or equal nonce.
    Dropped,
    /// Buried under more than the confirmation count. Terminal.
    Confirmed,
    /// Superseded by a confirmed transaction. Terminal.
    Failed,
}

impl TxState {
    /// Every state, in ledger order.
    pub const ALL: [TxState; 5] = [
        TxState::Pending,
        TxState::Received,
        TxState::Dropped,
        TxState::Confirmed,
        TxState::Failed,
    ];

    /// States that still need the chain to be watched.
    pub const ACTIVE: [TxState; 3] = [TxState::Pending, TxState::Received, TxState::Dropped];

    /// States no transition may leave.
    pub const TERMINAL: [TxState; 2] = [TxState::Confirmed, TxState::Failed];

    /// Returns true for `Confirmed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Confirmed | TxState::Failed)
    }

    /// Lowercase name used in persisted blobs and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TxState::Pending => "pending",
            TxState::Received => "received",
            TxState::Dropped => "dropped",
            TxState::Confirmed => "confirmed",
            TxState::Failed => "failed",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
