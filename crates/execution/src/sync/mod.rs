//! Synchronization of tracked transactions with the chain.
//!
//! Provides chain synchronization via:
//! - Batched reconciliation of transaction objects and receipts
//! - A new-block watcher that drives reconciliation

mod block_watcher;
pub mod reconciler;

pub use block_watcher::{BlockHandler, BlockWatcher, WatcherState};
pub use reconciler::{ApplyOutcome, FetchReport, FetchedTx};
