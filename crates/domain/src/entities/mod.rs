pub mod block;
pub mod receipt;
pub mod transaction;

// Re-export for easier access
pub use block::{Block, BlockId, ChainPointer};
pub use receipt::TransactionReceipt;
pub use transaction::{TransactionObject, TxInfo, TxRecord};
