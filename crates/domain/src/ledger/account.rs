//! Nonce-indexed slots of a single account.

use super::{LedgerError, LedgerResult};
use crate::enums::TxState;
use crate::value_objects::TxHash;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Slots of one account, one ordered nonce map per state.
///
/// `pending` maps a nonce to every competing hash broadcast for it. The
/// other states hold exactly one hash per nonce. Ordered maps keep every
/// nonce sequence strictly ascending without any bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLedger {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pending: BTreeMap<u64, BTreeSet<TxHash>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    received: BTreeMap<u64, TxHash>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    dropped: BTreeMap<u64, TxHash>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    confirmed: BTreeMap<u64, TxHash>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    failed: BTreeMap<u64, TxHash>,
}

impl AccountLedger {
    fn single(&self, state: TxState) -> Option<&BTreeMap<u64, TxHash>> {
        match state {
            TxState::Pending => None,
            TxState::Received => Some(&self.received),
            TxState::Dropped => Some(&self.dropped),
            TxState::Confirmed => Some(&self.confirmed),
            TxState::Failed => Some(&self.failed),
        }
    }

    fn single_mut(&mut self, state: TxState) -> Option<&mut BTreeMap<u64, TxHash>> {
        match state {
            TxState::Pending => None,
            TxState::Received => Some(&mut self.received),
            TxState::Dropped => Some(&mut self.dropped),
            TxState::Confirmed => Some(&mut self.confirmed),
            TxState::Failed => Some(&mut self.failed),
        }
    }

    /// Returns true if `hash` sits in `state` at `nonce`.
    #[must_use]
    pub fn contains(&self, state: TxState, nonce: u64, hash: &TxHash) -> bool {
        match self.single(state) {
            None => self
                .pending
                .get(&nonce)
                .is_some_and(|hashes| hashes.contains(hash)),
            Some(slots) => slots.get(&nonce) == Some(hash),
        }
    }

    /// Finds the state in which `hash` sits at `nonce`.
    #[must_use]
    pub fn locate(&self, nonce: u64, hash: &TxHash) -> Option<TxState> {
        TxState::ALL
            .into_iter()
            .find(|state| self.contains(*state, nonce, hash))
    }

    /// Hash occupying a single-hash slot, `None` for pending or empty slots.
    #[must_use]
    pub fn occupant(&self, state: TxState, nonce: u64) -> Option<TxHash> {
        self.single(state).and_then(|slots| slots.get(&nonce).copied())
    }

    pub(crate) fn insert(&mut self, state: TxState, nonce: u64, hash: TxHash) -> LedgerResult<()> {
        match self.single_mut(state) {
            None => {
                self.pending.entry(nonce).or_default().insert(hash);
                Ok(())
            }
            Some(slots) => match slots.get(&nonce) {
                Some(existing) if *existing != hash => Err(LedgerError::SlotOccupied {
                    hash,
                    existing: *existing,
                    nonce,
                    state,
                }),
                _ => {
                    slots.insert(nonce, hash);
                    Ok(())
                }
            },
        }
    }

    pub(crate) fn remove(&mut self, state: TxState, nonce: u64, hash: &TxHash) -> bool {
        match self.single_mut(state) {
            None => {
                let Some(hashes) = self.pending.get_mut(&nonce) else {
                    return false;
                };
                let removed = hashes.remove(hash);
                if hashes.is_empty() {
                    self.pending.remove(&nonce);
                }
                removed
            }
            Some(slots) => {
                if slots.get(&nonce) == Some(hash) {
                    slots.remove(&nonce);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Ascending nonces present in `state`.
    #[must_use]
    pub fn nonces(&self, state: TxState) -> Vec<u64> {
        match self.single(state) {
            None => self.pending.keys().copied().collect(),
            Some(slots) => slots.keys().copied().collect(),
        }
    }

    /// `(nonce, hash)` pairs in `state`, ascending by nonce then hash.
    #[must_use]
    pub fn entries(&self, state: TxState) -> Vec<(u64, TxHash)> {
        match self.single(state) {
            None => self
                .pending
                .iter()
                .flat_map(|(nonce, hashes)| hashes.iter().map(move |hash| (*nonce, *hash)))
                .collect(),
            Some(slots) => slots.iter().map(|(nonce, hash)| (*nonce, *hash)).collect(),
        }
    }

    /// Number of hashes in `state`.
    #[must_use]
    pub fn count(&self, state: TxState) -> usize {
        match self.single(state) {
            None => self.pending.values().map(BTreeSet::len).sum(),
            Some(slots) => slots.len(),
        }
    }

    #[must_use]
    pub fn highest_nonce(&self, state: TxState) -> Option<u64> {
        match self.single(state) {
            None => self.pending.keys().next_back().copied(),
            Some(slots) => slots.keys().next_back().copied(),
        }
    }

    #[must_use]
    pub fn lowest_nonce(&self, state: TxState) -> Option<u64> {
        match self.single(state) {
            None => self.pending.keys().next().copied(),
            Some(slots) => slots.keys().next().copied(),
        }
    }

    /// Returns true if any pending, received or dropped slot is occupied.
    #[must_use]
    pub fn has_active(&self) -> bool {
        !self.pending.is_empty() || !self.received.is_empty() || !self.dropped.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        TxState::ALL.into_iter().all(|state| self.count(state) == 0)
    }

    pub(crate) fn validate(&self) -> LedgerResult<()> {
        if let Some((nonce, _)) = self.pending.iter().find(|(_, hashes)| hashes.is_empty()) {
            return Err(LedgerError::Malformed(format!(
                "empty pending hash set at nonce {nonce}"
            )));
        }
        Ok(())
    }
}
