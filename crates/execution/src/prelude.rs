//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use txmirror_execution::prelude::*;
//! ```

// Config
pub use crate::config::{CachePolicy, TrackerConfig};

// Errors
pub use crate::error::{IngestionError, IngestionErrorKind, TrackerError, TrackerResult};

// Lifecycle
pub use crate::lifecycle::{SweepOutcome, apply_cache_policy, evict_terminal, sweep};

// Publisher
pub use crate::publisher::{ChangeListener, StatePublisher};

// State
pub use crate::state::TrackerSnapshot;

// Sync
pub use crate::sync::{
    ApplyOutcome, BlockHandler, BlockWatcher, FetchReport, FetchedTx, WatcherState,
};

// Tracker
pub use crate::tracker::TxTracker;
