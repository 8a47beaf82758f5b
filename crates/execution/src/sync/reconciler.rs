//! Reconciliation of tracked hashes against the chain.
//!
//! A pass runs in two halves. [`fetch`] gathers transaction objects,
//! receipts and receipt block timestamps with two batch calls and no lock
//! held. [`apply`] then folds everything into the ledger in one step so
//! readers never observe a half-applied batch.

use crate::error::{IngestionError, IngestionErrorKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, warn};
use txmirror_domain::{
    BlockId, LedgerError, LedgerSnapshot, TransactionObject, TransactionReceipt, TxHash, TxRecord,
    TxState,
};
use txmirror_protocols::{ChainRpc, RpcError, RpcRequest, RpcResult};

/// Chain data fetched for one hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedTx {
    pub hash: TxHash,
    pub object: RpcResult<Option<TransactionObject>>,
    /// Receipt with its block timestamp resolved when the lookup succeeded.
    pub receipt: RpcResult<Option<TransactionReceipt>>,
}

/// Result of the fetch half of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub txs: Vec<FetchedTx>,
    /// Failures not tied to a single hash, such as timestamp lookups.
    pub errors: Vec<RpcError>,
}

/// What applying a fetch report changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub ingestion_errors: Vec<IngestionError>,
    pub rpc_errors: Vec<RpcError>,
    pub ledger_errors: Vec<LedgerError>,
    /// Hashes newly inserted as pending.
    pub inserted: Vec<TxHash>,
    /// Hashes moved back to pending because their receipt disappeared.
    pub reverted: Vec<TxHash>,
    /// Hashes moved to received.
    pub received: Vec<TxHash>,
}

/// Fetches objects and receipts for `hashes`.
///
/// One batch carries every object and receipt request; a second batch
/// resolves the distinct receipt blocks for timestamps. A failed batch is
/// reported against every request it carried.
pub async fn fetch(rpc: &dyn ChainRpc, hashes: &[TxHash]) -> FetchReport {
    let mut report = FetchReport::default();
    if hashes.is_empty() {
        return report;
    }

    let requests: Vec<RpcRequest> = hashes
        .iter()
        .flat_map(|hash| [RpcRequest::Transaction(*hash), RpcRequest::Receipt(*hash)])
        .collect();
    let responses = match rpc.batch(requests.clone()).await {
        Ok(responses) if responses.len() == requests.len() => responses,
        Ok(responses) => {
            let err = RpcError::Decode {
                method: "batch".to_string(),
                reason: format!("{} responses for {} requests", responses.len(), requests.len()),
            };
            vec![Err(err); requests.len()]
        }
        Err(e) => vec![Err(e); requests.len()],
    };

    let mut responses = responses.into_iter();
    for hash in hashes {
        let (Some(object), Some(receipt)) = (responses.next(), responses.next()) else {
            break;
        };
        report.txs.push(FetchedTx {
            hash: *hash,
            object: object.and_then(|r| r.into_transaction()),
            receipt: receipt.and_then(|r| r.into_receipt()),
        });
    }

    resolve_timestamps(rpc, &mut report).await;
    debug!(hashes = hashes.len(), errors = report.errors.len(), "Fetched batch");
    report
}

async fn resolve_timestamps(rpc: &dyn ChainRpc, report: &mut FetchReport) {
    let blocks: BTreeSet<u64> = report
        .txs
        .iter()
        .filter_map(|tx| tx.receipt.as_ref().ok()?.as_ref().map(|r| r.block_number))
        .collect();
    if blocks.is_empty() {
        return;
    }

    let numbers: Vec<u64> = blocks.into_iter().collect();
    let requests = numbers
        .iter()
        .map(|n| RpcRequest::Block(BlockId::Number(*n)))
        .collect();
    let responses = match rpc.batch(requests).await {
        Ok(responses) => responses,
        Err(e) => {
            report.errors.push(e);
            return;
        }
    };

    let mut timestamps = BTreeMap::new();
    for (number, response) in numbers.into_iter().zip(responses) {
        match response.and_then(|r| r.into_block()) {
            Ok(Some(block)) => {
                timestamps.insert(number, block.timestamp);
            }
            Ok(None) => debug!(block = number, "Receipt block not found"),
            Err(e) => report.errors.push(e),
        }
    }

    for tx in &mut report.txs {
        if let Ok(Some(receipt)) = &mut tx.receipt
            && let Some(timestamp) = timestamps.get(&receipt.block_number)
        {
            receipt.timestamp = Some(*timestamp);
        }
    }
}

/// Applies a fetch report to the tracked state.
///
/// Objects are applied first. Absent receipts are applied before present
/// ones so a replacement can take over a nonce vacated in the same batch.
/// `current_block` stamps the first-seen block of new hashes.
pub fn apply(
    tracked: &mut LedgerSnapshot,
    report: FetchReport,
    current_block: u64,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome {
        rpc_errors: report.errors,
        ..Default::default()
    };
    let mut absent = Vec::new();
    let mut present = Vec::new();

    for fetched in report.txs {
        let hash = fetched.hash;
        match fetched.object {
            Ok(Some(object)) => {
                insert_if_untracked(tracked, &object, current_block, &mut outcome);
                tracked.objects.insert(hash, object);
            }
            Ok(None) => {
                forget_unknown(tracked, hash, &mut outcome);
                continue;
            }
            Err(e) => {
                warn!(hash = %hash, error = %e, "Transaction lookup failed");
                outcome.rpc_errors.push(e);
            }
        }

        match fetched.receipt {
            Ok(None) => absent.push(hash),
            Ok(Some(receipt)) => present.push((hash, receipt)),
            Err(e) => {
                warn!(hash = %hash, error = %e, "Receipt lookup failed");
                outcome.rpc_errors.push(e);
            }
        }
    }

    for hash in absent {
        let record = record_of(tracked, &hash);
        // A lagging node may not serve receipts of settled transactions yet.
        if record.as_ref().is_some_and(|record| record.state.is_terminal()) {
            continue;
        }
        tracked.receipts.remove(&hash);
        let Some(record) = record else {
            continue;
        };
        if matches!(record.state, TxState::Received | TxState::Dropped) {
            match tracked.accounts.transition(&record, TxState::Pending) {
                Ok(_) => {
                    debug!(hash = %hash, from = %record.state, "Receipt disappeared");
                    outcome.reverted.push(hash);
                }
                Err(e) => reject(&mut outcome, e),
            }
        }
    }

    for (hash, receipt) in present {
        let record = record_of(tracked, &hash);
        tracked.receipts.insert(hash, receipt);
        let Some(record) = record else {
            continue;
        };
        if matches!(record.state, TxState::Pending | TxState::Dropped) {
            match tracked.accounts.transition(&record, TxState::Received) {
                Ok(_) => outcome.received.push(hash),
                Err(e) => reject(&mut outcome, e),
            }
        }
    }

    outcome
}

fn record_of(tracked: &LedgerSnapshot, hash: &TxHash) -> Option<TxRecord> {
    let object = tracked.objects.get(hash)?;
    let state = tracked.accounts.locate(&object.from, object.nonce, hash)?;
    Some(object.record(state))
}

fn insert_if_untracked(
    tracked: &mut LedgerSnapshot,
    object: &TransactionObject,
    current_block: u64,
    outcome: &mut ApplyOutcome,
) {
    // A stale cached object may place the hash at another nonce.
    if let Some(previous) = tracked.objects.get(&object.hash)
        && (previous.from != object.from || previous.nonce != object.nonce)
        && let Some(state) = tracked
            .accounts
            .locate(&previous.from, previous.nonce, &object.hash)
    {
        tracked
            .accounts
            .remove_slot(&previous.from, state, previous.nonce, &object.hash);
    }

    if tracked
        .accounts
        .locate(&object.from, object.nonce, &object.hash)
        .is_some()
    {
        return;
    }
    match tracked
        .accounts
        .add_slot(object.from, TxState::Pending, object.nonce, object.hash)
    {
        Ok(()) => {
            tracked.first_seen.entry(object.hash).or_insert(current_block);
            outcome.inserted.push(object.hash);
        }
        Err(e) => reject(outcome, e),
    }
}

fn forget_unknown(tracked: &mut LedgerSnapshot, hash: TxHash, outcome: &mut ApplyOutcome) {
    if let Some(object) = tracked.objects.remove(&hash)
        && let Some(state) = tracked.accounts.locate(&object.from, object.nonce, &hash)
    {
        tracked
            .accounts
            .remove_slot(&object.from, state, object.nonce, &hash);
    }
    tracked.receipts.remove(&hash);
    tracked.first_seen.remove(&hash);

    let kind = if tracked.info.contains_key(&hash) {
        IngestionErrorKind::NotFound
    } else {
        IngestionErrorKind::Unrequested
    };
    debug!(hash = %hash, kind = ?kind, "Transaction unknown to node");
    outcome.ingestion_errors.push(IngestionError { hash, kind });
}

fn reject(outcome: &mut ApplyOutcome, err: LedgerError) {
    error!(error = %err, "Ledger rejected reconciliation");
    outcome.ledger_errors.push(err);
}
