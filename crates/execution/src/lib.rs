//! Transaction lifecycle tracking engine.
//!
//! This crate mirrors the on-chain lifecycle of submitted transactions:
//! - Nonce-indexed ledger reconciliation against a chain RPC
//! - Confirmation, dropping and failing of competing transactions
//! - Fork detection from new-block notifications
//! - Eviction of old terminal transactions
//! - Persistence of the tracked set per chain
//! - Publication of consistent state snapshots

/// Prelude module for convenient imports.
pub mod prelude;

/// Tracker configuration.
pub mod config;
/// Tracker errors.
pub mod error;
/// Transaction lifecycle progression.
pub mod lifecycle;
/// Snapshot publication.
pub mod publisher;
/// Published tracker state.
pub mod state;
/// Chain synchronization.
pub mod sync;
/// The tracker.
pub mod tracker;

pub use config::{CachePolicy, TrackerConfig};
pub use error::{IngestionError, IngestionErrorKind, TrackerError, TrackerResult};
pub use state::TrackerSnapshot;
pub use tracker::TxTracker;
