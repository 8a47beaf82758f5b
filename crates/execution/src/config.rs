//! Tracker configuration.

use serde::{Deserialize, Serialize};

/// What happens to cached data when a terminal slot is evicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Keep Info, objects, receipts and first-seen blocks of evicted hashes.
    #[default]
    Retain,
    /// Forget every cached entry of an evicted hash.
    PruneEvicted,
}

/// Configuration fixed at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Blocks that must be mined on top of a receipt's block before the
    /// transaction is confirmed.
    pub confirm_count: u64,
    /// Maximum number of confirmed plus failed slots kept per account.
    pub buffer_size: usize,
    /// Cache handling on eviction.
    pub cache_policy: CachePolicy,
    /// Fail pending transactions first seen more than this many blocks ago.
    /// `None` keeps them pending indefinitely.
    pub max_pending_blocks: Option<u64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirm_count: 12,
            buffer_size: 100,
            cache_policy: CachePolicy::Retain,
            max_pending_blocks: None,
        }
    }
}

impl TrackerConfig {
    /// Sets the confirmation depth.
    #[must_use]
    pub fn with_confirm_count(mut self, confirm_count: u64) -> Self {
        self.confirm_count = confirm_count;
        self
    }

    /// Sets the per-account terminal buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    #[must_use]
    pub fn with_max_pending_blocks(mut self, max_pending_blocks: u64) -> Self {
        self.max_pending_blocks = Some(max_pending_blocks);
        self
    }
}
