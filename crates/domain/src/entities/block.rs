use crate::value_objects::BlockHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Selector for a block lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockId {
    Number(u64),
    Hash(BlockHash),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Number(n) => write!(f, "#{n}"),
            BlockId::Hash(h) => write!(f, "{h:#x}"),
        }
    }
}

/// Header fields of a block needed for fork detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub timestamp: u64,
}

/// Which chain is tracked and the most recently recorded block on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainPointer {
    /// Hash of block zero.
    pub genesis: BlockHash,
    pub block_number: u64,
    /// `None` until a block has been recorded.
    pub block_hash: Option<BlockHash>,
    pub timestamp: u64,
    /// Block number at which the most recent fork was detected.
    pub last_fork_block_number: u64,
}

impl ChainPointer {
    /// Creates a pointer for a chain with no recorded block.
    pub fn new(genesis: BlockHash) -> Self {
        Self {
            genesis,
            ..Default::default()
        }
    }

    /// Records `block` as the latest block without fork bookkeeping.
    pub fn record(&mut self, block: &Block) {
        self.block_number = block.number;
        self.block_hash = Some(block.hash);
        self.timestamp = block.timestamp;
    }

    /// Returns true if `block` does not extend the recorded block.
    ///
    /// With no recorded block every block counts as a fork.
    #[must_use]
    pub fn is_fork(&self, block: &Block) -> bool {
        self.block_hash != Some(block.parent_hash)
    }

    /// Returns true if `block` is the block already recorded.
    #[must_use]
    pub fn is_recorded(&self, block: &Block) -> bool {
        self.block_hash == Some(block.hash)
    }
}
