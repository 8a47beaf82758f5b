//! Per-account, nonce-indexed transaction state machine.
//!
//! The ledger is the authoritative answer to "which state is this
//! transaction in". Every hash occupies at most one (account, state, nonce)
//! slot; `Confirmed` and `Failed` slots are never left once entered.

mod account;
mod error;

pub use account::AccountLedger;
pub use error::{LedgerError, LedgerResult};

use crate::entities::TxRecord;
use crate::enums::TxState;
use crate::value_objects::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Slots of every tracked account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    accounts: BTreeMap<Address, AccountLedger>,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `hash` in `state` at (`account`, `nonce`).
    ///
    /// # Errors
    /// `DuplicateHash` if the hash already sits at this nonce in any state,
    /// `SlotOccupied` if a single-hash slot holds another transaction.
    pub fn add_slot(
        &mut self,
        account: Address,
        state: TxState,
        nonce: u64,
        hash: TxHash,
    ) -> LedgerResult<()> {
        let entry = self.accounts.entry(account).or_default();
        if let Some(existing) = entry.locate(nonce, &hash) {
            return Err(LedgerError::DuplicateHash {
                hash,
                nonce,
                state: existing,
            });
        }
        entry.insert(state, nonce, hash)
    }

    /// Removes `hash` from the given slot. Returns whether it was there.
    pub fn remove_slot(
        &mut self,
        account: &Address,
        state: TxState,
        nonce: u64,
        hash: &TxHash,
    ) -> bool {
        let Some(entry) = self.accounts.get_mut(account) else {
            return false;
        };
        let removed = entry.remove(state, nonce, hash);
        if entry.is_empty() {
            self.accounts.remove(account);
        }
        removed
    }

    /// Moves the transaction described by `record` into `new_state`.
    ///
    /// Moving into the current state is a no-op. The ledger is left
    /// untouched when an error is returned.
    ///
    /// # Errors
    /// `IllegalTransition` when leaving a terminal state, `SlotNotFound` when
    /// `record` is stale, `SlotOccupied` when the target slot is taken.
    pub fn transition(&mut self, record: &TxRecord, new_state: TxState) -> LedgerResult<TxRecord> {
        if record.state == new_state {
            return Ok(*record);
        }
        if record.state.is_terminal() {
            return Err(LedgerError::IllegalTransition {
                hash: record.hash,
                from: record.state,
                to: new_state,
            });
        }

        let not_found = LedgerError::SlotNotFound {
            hash: record.hash,
            nonce: record.nonce,
            state: record.state,
        };
        let Some(entry) = self.accounts.get_mut(&record.account) else {
            return Err(not_found);
        };
        if !entry.contains(record.state, record.nonce, &record.hash) {
            return Err(not_found);
        }
        if let Some(existing) = entry.occupant(new_state, record.nonce)
            && existing != record.hash
        {
            return Err(LedgerError::SlotOccupied {
                hash: record.hash,
                existing,
                nonce: record.nonce,
                state: new_state,
            });
        }

        entry.remove(record.state, record.nonce, &record.hash);
        entry.insert(new_state, record.nonce, record.hash)?;
        Ok(record.in_state(new_state))
    }

    /// Records in the given states, optionally restricted to one account.
    ///
    /// Ordered by account, then by the order of `states`, then by nonce.
    #[must_use]
    pub fn states_of(&self, account: Option<&Address>, states: &[TxState]) -> Vec<TxRecord> {
        let accounts: Vec<(&Address, &AccountLedger)> = match account {
            Some(address) => self.accounts.get_key_value(address).into_iter().collect(),
            None => self.accounts.iter().collect(),
        };

        let mut records = Vec::new();
        for (address, entry) in accounts {
            for state in states {
                records.extend(entry.entries(*state).into_iter().map(|(nonce, hash)| {
                    TxRecord {
                        hash,
                        account: *address,
                        nonce,
                        state: *state,
                    }
                }));
            }
        }
        records
    }

    /// Highest nonce of `account` in `state`.
    #[must_use]
    pub fn highest_nonce(&self, account: &Address, state: TxState) -> Option<u64> {
        self.accounts
            .get(account)
            .and_then(|entry| entry.highest_nonce(state))
    }

    /// Lowest nonce of `account` in `state`.
    #[must_use]
    pub fn lowest_nonce(&self, account: &Address, state: TxState) -> Option<u64> {
        self.accounts
            .get(account)
            .and_then(|entry| entry.lowest_nonce(state))
    }

    /// Number of hashes `account` holds in `state`.
    #[must_use]
    pub fn count(&self, account: &Address, state: TxState) -> usize {
        self.accounts
            .get(account)
            .map_or(0, |entry| entry.count(state))
    }

    /// State in which `hash` sits at (`account`, `nonce`), if tracked.
    #[must_use]
    pub fn locate(&self, account: &Address, nonce: u64, hash: &TxHash) -> Option<TxState> {
        self.accounts
            .get(account)
            .and_then(|entry| entry.locate(nonce, hash))
    }

    /// Slots of one account.
    #[must_use]
    pub fn account(&self, account: &Address) -> Option<&AccountLedger> {
        self.accounts.get(account)
    }

    /// Tracked accounts in ascending order.
    pub fn accounts(&self) -> impl Iterator<Item = &Address> {
        self.accounts.keys()
    }

    /// Returns true if any account holds a pending, received or dropped slot.
    #[must_use]
    pub fn has_active(&self) -> bool {
        self.accounts.values().any(AccountLedger::has_active)
    }

    /// Hashes in the given states across all accounts.
    #[must_use]
    pub fn hashes_in(&self, states: &[TxState]) -> Vec<TxHash> {
        self.states_of(None, states)
            .into_iter()
            .map(|record| record.hash)
            .collect()
    }

    /// Hashes still in a non-terminal state.
    #[must_use]
    pub fn active_hashes(&self) -> Vec<TxHash> {
        self.hashes_in(&TxState::ACTIVE)
    }

    /// Removes every slot in `state` and returns what was removed.
    pub fn remove_state(&mut self, state: TxState) -> Vec<TxRecord> {
        let records = self.states_of(None, &[state]);
        for record in &records {
            self.remove_slot(&record.account, record.state, record.nonce, &record.hash);
        }
        records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Total number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts
            .values()
            .map(|entry| TxState::ALL.into_iter().map(|s| entry.count(s)).sum::<usize>())
            .sum()
    }

    pub fn clear(&mut self) {
        self.accounts.clear();
    }

    /// Checks structural invariants of data that did not come from the
    /// ledger's own operations, such as a decoded snapshot.
    ///
    /// # Errors
    /// `Malformed` for empty accounts or pending sets, `DuplicateHash` when a
    /// hash occupies more than one slot.
    pub fn validate(&self) -> LedgerResult<()> {
        let mut seen: HashMap<TxHash, TxState> = HashMap::new();
        for (address, entry) in &self.accounts {
            if entry.is_empty() {
                return Err(LedgerError::Malformed(format!(
                    "account {address:#x} has no slots"
                )));
            }
            entry.validate()?;
            for state in TxState::ALL {
                for (nonce, hash) in entry.entries(state) {
                    if let Some(previous) = seen.insert(hash, state) {
                        return Err(LedgerError::DuplicateHash {
                            hash,
                            nonce,
                            state: previous,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
