//! Transaction lifecycle progression.
//!
//! Moves tracked transactions forward as blocks arrive:
//! - Confirmation, dropping and failing of competing nonces
//! - Optional expiry of long-pending transactions
//! - Eviction of the oldest terminal slots

mod eviction;
mod promotion;

pub use eviction::{apply_cache_policy, evict_terminal};
pub use promotion::{SweepOutcome, sweep};
