use crate::value_objects::{BlockHash, TxHash};
use serde::{Deserialize, Serialize};

/// Proof that a transaction was included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<BlockHash>,
    /// Timestamp of the including block, resolved after the receipt is fetched.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl TransactionReceipt {
    pub fn new(transaction_hash: TxHash, block_number: u64) -> Self {
        Self {
            transaction_hash,
            block_number,
            block_hash: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_block_hash(mut self, block_hash: BlockHash) -> Self {
        self.block_hash = Some(block_hash);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Number of blocks mined on top of the including block at `current_block`.
    ///
    /// Zero when `current_block` is at or behind the receipt's block.
    #[must_use]
    pub fn depth_at(&self, current_block: u64) -> u64 {
        current_block.saturating_sub(self.block_number)
    }
}
