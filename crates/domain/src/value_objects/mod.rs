pub mod hex;

pub use hex::{format_hex, parse_h160, parse_h256};

use primitive_types::{H160, H256};

/// Hash of a transaction.
pub type TxHash = H256;

/// Hash of a block.
pub type BlockHash = H256;

/// Account address of a transaction sender.
pub type Address = H160;

/// Key under which a chain's snapshot is persisted: the genesis hash as
/// `0x`-prefixed lowercase hex.
#[must_use]
pub fn genesis_key(genesis: &BlockHash) -> String {
    format!("{genesis:#x}")
}
