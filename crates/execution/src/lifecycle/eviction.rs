//! Bounded retention of terminal slots.

use crate::config::CachePolicy;
use tracing::debug;
use txmirror_domain::{Address, Ledger, LedgerSnapshot, TxRecord, TxState};

/// Evicts the oldest terminal slots of `account` until at most `buffer_size`
/// confirmed plus failed slots remain.
///
/// The lower of the lowest confirmed and lowest failed nonce goes first;
/// failed wins ties. Pending, received and dropped slots are never touched.
/// Returns the evicted records in eviction order.
pub fn evict_terminal(
    ledger: &mut Ledger,
    account: &Address,
    buffer_size: usize,
) -> Vec<TxRecord> {
    let mut evicted = Vec::new();

    while ledger.count(account, TxState::Confirmed) + ledger.count(account, TxState::Failed)
        > buffer_size
    {
        let confirmed = ledger.lowest_nonce(account, TxState::Confirmed);
        let failed = ledger.lowest_nonce(account, TxState::Failed);
        let (state, nonce) = match (confirmed, failed) {
            (Some(c), Some(f)) if f <= c => (TxState::Failed, f),
            (Some(c), _) => (TxState::Confirmed, c),
            (None, Some(f)) => (TxState::Failed, f),
            (None, None) => break,
        };

        let Some(hash) = ledger
            .account(account)
            .and_then(|entry| entry.occupant(state, nonce))
        else {
            break;
        };
        ledger.remove_slot(account, state, nonce, &hash);
        debug!(account = %account, hash = %hash, nonce, state = %state, "Evicted terminal slot");
        evicted.push(TxRecord {
            hash,
            account: *account,
            nonce,
            state,
        });
    }

    evicted
}

/// Applies `policy` to the caches of evicted hashes.
pub fn apply_cache_policy(
    tracked: &mut LedgerSnapshot,
    evicted: &[TxRecord],
    policy: CachePolicy,
) {
    if policy == CachePolicy::PruneEvicted {
        for record in evicted {
            tracked.forget(&record.hash);
        }
    }
}
