//! Block-driven promotion sweep.
//!
//! After every reconciliation pass each account is swept against the
//! current block: deep enough receipts confirm, competitors of received or
//! confirmed nonces drop or fail, and terminal slots beyond the buffer are
//! evicted. Confirmation runs before dropping and failing because a freshly
//! confirmed nonce fails its competitors in the same sweep.

use super::eviction::{apply_cache_policy, evict_terminal};
use crate::config::TrackerConfig;
use tracing::{debug, error};
use txmirror_domain::{Address, LedgerError, LedgerSnapshot, TxRecord, TxState};

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub confirmed: Vec<TxRecord>,
    pub dropped: Vec<TxRecord>,
    pub failed: Vec<TxRecord>,
    /// Pending transactions failed by the max-pending-age policy.
    pub expired: Vec<TxRecord>,
    /// Competing hashes removed because their nonce already failed.
    pub superseded: Vec<TxRecord>,
    pub evicted: Vec<TxRecord>,
    /// Transitions rejected by the ledger. The sweep skips them.
    pub errors: Vec<LedgerError>,
}

impl SweepOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
            && self.dropped.is_empty()
            && self.failed.is_empty()
            && self.expired.is_empty()
            && self.superseded.is_empty()
            && self.evicted.is_empty()
            && self.errors.is_empty()
    }
}

/// Sweeps every account at `current_block`.
pub fn sweep(
    tracked: &mut LedgerSnapshot,
    current_block: u64,
    config: &TrackerConfig,
) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    let accounts: Vec<Address> = tracked.accounts.accounts().copied().collect();
    for account in accounts {
        sweep_account(tracked, &account, current_block, config, &mut outcome);
    }

    if !outcome.is_empty() {
        debug!(
            block = current_block,
            confirmed = outcome.confirmed.len(),
            dropped = outcome.dropped.len(),
            failed = outcome.failed.len(),
            expired = outcome.expired.len(),
            evicted = outcome.evicted.len(),
            "Promotion sweep"
        );
    }
    outcome
}

fn sweep_account(
    tracked: &mut LedgerSnapshot,
    account: &Address,
    current_block: u64,
    config: &TrackerConfig,
    outcome: &mut SweepOutcome,
) {
    let mut latest_confirmed = tracked.accounts.highest_nonce(account, TxState::Confirmed);
    let mut latest_received: Option<u64> = None;

    for record in tracked.accounts.states_of(Some(account), &[TxState::Received]) {
        let deep_enough = tracked
            .receipts
            .get(&record.hash)
            .is_some_and(|receipt| receipt.depth_at(current_block) > config.confirm_count);
        if !deep_enough {
            latest_received = latest_received.max(Some(record.nonce));
            continue;
        }
        match tracked.accounts.transition(&record, TxState::Confirmed) {
            Ok(confirmed) => {
                latest_confirmed = latest_confirmed.max(Some(record.nonce));
                outcome.confirmed.push(confirmed);
            }
            Err(e) => reject(outcome, e),
        }
    }

    if let Some(latest) = latest_received {
        for record in tracked.accounts.states_of(Some(account), &[TxState::Pending]) {
            if record.nonce > latest {
                break;
            }
            // A second competitor stays pending until its nonce fails.
            if tracked
                .accounts
                .account(account)
                .and_then(|entry| entry.occupant(TxState::Dropped, record.nonce))
                .is_some()
            {
                continue;
            }
            match tracked.accounts.transition(&record, TxState::Dropped) {
                Ok(dropped) => outcome.dropped.push(dropped),
                Err(e) => reject(outcome, e),
            }
        }
    }

    if let Some(latest) = latest_confirmed {
        let losers = tracked
            .accounts
            .states_of(Some(account), &[TxState::Dropped, TxState::Pending]);
        for record in losers.into_iter().filter(|r| r.nonce <= latest) {
            fail(tracked, record, outcome, false);
        }
    }

    if let Some(max_age) = config.max_pending_blocks {
        for record in tracked.accounts.states_of(Some(account), &[TxState::Pending]) {
            let expired = tracked
                .first_seen
                .get(&record.hash)
                .is_some_and(|seen| current_block.saturating_sub(*seen) > max_age);
            if expired {
                fail(tracked, record, outcome, true);
            }
        }
    }

    let evicted = evict_terminal(&mut tracked.accounts, account, config.buffer_size);
    apply_cache_policy(tracked, &evicted, config.cache_policy);
    outcome.evicted.extend(evicted);
}

/// Moves `record` to failed, or removes it when another hash already failed
/// at its nonce.
fn fail(
    tracked: &mut LedgerSnapshot,
    record: TxRecord,
    outcome: &mut SweepOutcome,
    expired: bool,
) {
    let taken = tracked
        .accounts
        .account(&record.account)
        .and_then(|entry| entry.occupant(TxState::Failed, record.nonce))
        .is_some_and(|existing| existing != record.hash);
    if taken {
        tracked
            .accounts
            .remove_slot(&record.account, record.state, record.nonce, &record.hash);
        debug!(hash = %record.hash, nonce = record.nonce, "Removed superseded competitor");
        outcome.superseded.push(record);
        return;
    }

    match tracked.accounts.transition(&record, TxState::Failed) {
        Ok(failed) if expired => outcome.expired.push(failed),
        Ok(failed) => outcome.failed.push(failed),
        Err(e) => reject(outcome, e),
    }
}

fn reject(outcome: &mut SweepOutcome, err: LedgerError) {
    error!(error = %err, "Ledger rejected promotion");
    outcome.errors.push(err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CachePolicy;
    use txmirror_domain::{TransactionReceipt, TxHash};

    fn alice() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn hash(n: u64) -> TxHash {
        TxHash::from_low_u64_be(n + 1)
    }

    fn slot(tracked: &mut LedgerSnapshot, state: TxState, nonce: u64, n: u64) {
        tracked.accounts.add_slot(alice(), state, nonce, hash(n)).unwrap();
    }

    fn received(tracked: &mut LedgerSnapshot, nonce: u64, n: u64, block: u64) {
        slot(tracked, TxState::Received, nonce, n);
        tracked
            .receipts
            .insert(hash(n), TransactionReceipt::new(hash(n), block));
    }

    fn hashes(tracked: &LedgerSnapshot, state: TxState) -> Vec<TxHash> {
        tracked.accounts.hashes_in(&[state])
    }

    fn config(confirm_count: u64, buffer_size: usize) -> TrackerConfig {
        TrackerConfig::default()
            .with_confirm_count(confirm_count)
            .with_buffer_size(buffer_size)
    }

    #[test]
    fn test_confirms_strictly_after_confirm_count() {
        let mut tracked = LedgerSnapshot::default();
        received(&mut tracked, 0, 0, 2);
        slot(&mut tracked, TxState::Pending, 0, 1);

        let outcome = sweep(&mut tracked, 7, &config(5, 100));
        assert!(outcome.confirmed.is_empty());
        assert_eq!(hashes(&tracked, TxState::Received), vec![hash(0)]);
        assert_eq!(hashes(&tracked, TxState::Dropped), vec![hash(1)]);

        let outcome = sweep(&mut tracked, 8, &config(5, 100));
        assert_eq!(outcome.confirmed.len(), 1);
        assert_eq!(hashes(&tracked, TxState::Confirmed), vec![hash(0)]);
        assert_eq!(hashes(&tracked, TxState::Failed), vec![hash(1)]);
    }

    #[test]
    fn test_pending_above_latest_received_stays() {
        let mut tracked = LedgerSnapshot::default();
        received(&mut tracked, 1, 0, 10);
        slot(&mut tracked, TxState::Pending, 0, 1);
        slot(&mut tracked, TxState::Pending, 2, 2);

        sweep(&mut tracked, 10, &config(2, 100));

        assert_eq!(hashes(&tracked, TxState::Dropped), vec![hash(1)]);
        assert_eq!(hashes(&tracked, TxState::Pending), vec![hash(2)]);
    }

    #[test]
    fn test_confirmed_nonce_fails_every_competitor() {
        let mut tracked = LedgerSnapshot::default();
        received(&mut tracked, 0, 0, 1);
        slot(&mut tracked, TxState::Pending, 0, 1);
        slot(&mut tracked, TxState::Pending, 0, 2);

        let outcome = sweep(&mut tracked, 20, &config(2, 100));

        assert_eq!(hashes(&tracked, TxState::Confirmed), vec![hash(0)]);
        assert_eq!(tracked.accounts.count(&alice(), TxState::Failed), 1);
        assert_eq!(outcome.superseded.len(), 1);
        assert!(!tracked.accounts.has_active());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_sweep_evicts_after_promotion() {
        let mut tracked = LedgerSnapshot::default();
        slot(&mut tracked, TxState::Confirmed, 0, 0);
        slot(&mut tracked, TxState::Failed, 0, 1);
        received(&mut tracked, 1, 2, 3);
        slot(&mut tracked, TxState::Dropped, 1, 3);

        let outcome = sweep(&mut tracked, 6, &config(2, 2));

        assert_eq!(outcome.evicted.len(), 2);
        assert_eq!(hashes(&tracked, TxState::Confirmed), vec![hash(2)]);
        assert_eq!(hashes(&tracked, TxState::Failed), vec![hash(3)]);
    }

    #[test]
    fn test_max_pending_age_expires_pending() {
        let mut tracked = LedgerSnapshot::default();
        slot(&mut tracked, TxState::Pending, 0, 0);
        slot(&mut tracked, TxState::Pending, 1, 1);
        tracked.first_seen.insert(hash(0), 10);
        tracked.first_seen.insert(hash(1), 15);
        let config = TrackerConfig::default().with_max_pending_blocks(5);

        let outcome = sweep(&mut tracked, 16, &config);

        assert_eq!(outcome.expired.len(), 1);
        assert_eq!(hashes(&tracked, TxState::Failed), vec![hash(0)]);
        assert_eq!(hashes(&tracked, TxState::Pending), vec![hash(1)]);
    }

    #[test]
    fn test_prune_policy_applies_to_evicted() {
        let mut tracked = LedgerSnapshot::default();
        received(&mut tracked, 0, 0, 1);
        let config = config(0, 0).with_cache_policy(CachePolicy::PruneEvicted);

        let outcome = sweep(&mut tracked, 5, &config);

        assert_eq!(outcome.confirmed.len(), 1);
        assert_eq!(outcome.evicted.len(), 1);
        assert!(tracked.accounts.is_empty());
        assert!(tracked.receipts.is_empty());
    }
}
