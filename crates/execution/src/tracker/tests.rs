use super::*;
use crate::config::CachePolicy;
use crate::error::IngestionErrorKind;
use std::time::Duration;
use txmirror_data::MemoryStore;
use txmirror_domain::Address;
use txmirror_protocols::mock::{MockChain, MockMethod, MockTransaction};

fn alice() -> Address {
    Address::repeat_byte(0xaa)
}

fn bob() -> Address {
    Address::repeat_byte(0xbb)
}

fn tx(n: u64) -> TxHash {
    TxHash::from_low_u64_be(n + 1)
}

fn infos(hashes: &[TxHash]) -> Vec<TxInfo> {
    hashes.iter().map(|hash| TxInfo::new(*hash)).collect()
}

async fn connect(chain: &MockChain, store: &MemoryStore, config: TrackerConfig) -> TxTracker {
    TxTracker::connect(Arc::new(chain.clone()), Arc::new(store.clone()), config)
        .await
        .unwrap()
}

async fn wait_until<F>(tracker: &TxTracker, done: F) -> Arc<TrackerSnapshot>
where
    F: Fn(&TrackerSnapshot) -> bool,
{
    let mut rx = tracker.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| done(s)))
        .await
        .expect("timed out waiting for snapshot")
        .unwrap()
        .clone();
    snapshot
}

/// Mines one block and waits until the tracker has processed it.
async fn step(chain: &MockChain, tracker: &TxTracker) -> Arc<TrackerSnapshot> {
    chain.advance();
    let head = chain.head();
    wait_until(tracker, |s| s.block_number >= head).await
}

async fn step_to(chain: &MockChain, tracker: &TxTracker, number: u64) -> Arc<TrackerSnapshot> {
    let mut snapshot = tracker.snapshot();
    while chain.head() < number {
        snapshot = step(chain, tracker).await;
    }
    snapshot
}

#[tokio::test]
async fn test_overwritten_nonce_fails_after_confirmation() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0).received_at(2))
        .with_transaction(MockTransaction::new(tx(1), alice(), 0));
    let config = TrackerConfig::default().with_confirm_count(5);
    let tracker = connect(&chain, &MemoryStore::new(), config).await;

    let errors = tracker.add(infos(&[tx(0), tx(1)])).await.unwrap();
    assert!(errors.is_empty());
    assert_eq!(tracker.snapshot().hashes(TxState::Pending), vec![tx(0), tx(1)]);
    assert_eq!(tracker.watcher_state().await, WatcherState::Watching);

    let snapshot = step_to(&chain, &tracker, 2).await;
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);
    assert_eq!(snapshot.hashes(TxState::Dropped), vec![tx(1)]);

    let snapshot = step_to(&chain, &tracker, 7).await;
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);

    let snapshot = step_to(&chain, &tracker, 8).await;
    assert_eq!(snapshot.hashes(TxState::Confirmed), vec![tx(0)]);
    assert_eq!(snapshot.hashes(TxState::Failed), vec![tx(1)]);
    assert!(!snapshot.has_active());
    assert_eq!(tracker.watcher_state().await, WatcherState::Idle);
    assert_eq!(tracker.state_of(&tx(1)).unwrap(), Some(TxState::Failed));
}

#[tokio::test]
async fn test_terminal_buffer_keeps_newest_slots() {
    let mut chain = MockChain::new();
    let mut hashes = Vec::new();
    for nonce in 0..4 {
        let winner = tx(2 * nonce);
        let loser = tx(2 * nonce + 1);
        chain = chain
            .with_transaction(MockTransaction::new(winner, alice(), nonce).received_at(nonce + 2))
            .with_transaction(MockTransaction::new(loser, alice(), nonce));
        hashes.extend([winner, loser]);
    }
    let config = TrackerConfig::default()
        .with_confirm_count(2)
        .with_buffer_size(2);
    let tracker = connect(&chain, &MemoryStore::new(), config).await;
    tracker.add(infos(&hashes)).await.unwrap();

    let snapshot = step_to(&chain, &tracker, 5).await;
    assert_eq!(snapshot.hashes(TxState::Confirmed), vec![tx(0)]);
    assert_eq!(snapshot.hashes(TxState::Failed), vec![tx(1)]);
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(2), tx(4), tx(6)]);
    assert_eq!(snapshot.hashes(TxState::Dropped), vec![tx(3), tx(5), tx(7)]);

    let snapshot = step_to(&chain, &tracker, 6).await;
    assert_eq!(snapshot.hashes(TxState::Confirmed), vec![tx(2)]);
    assert_eq!(snapshot.hashes(TxState::Failed), vec![tx(3)]);

    let snapshot = step_to(&chain, &tracker, 8).await;
    assert_eq!(snapshot.hashes(TxState::Confirmed), vec![tx(6)]);
    assert_eq!(snapshot.hashes(TxState::Failed), vec![tx(7)]);
    assert!(!snapshot.has_active());
    // Evicted hashes keep their cached data by default.
    assert!(snapshot.objects.contains_key(&tx(0)));
    assert_eq!(tracker.state_of(&tx(0)).unwrap(), None);
}

#[tokio::test]
async fn test_fork_returns_received_to_pending() {
    let chain = MockChain::new()
        .with_transaction(
            MockTransaction::new(tx(0), alice(), 0)
                .received_on(0, 4)
                .received_on(1, 8),
        )
        .fork_at(6, 1);
    let config = TrackerConfig::default().with_confirm_count(5);
    let tracker = connect(&chain, &MemoryStore::new(), config).await;
    tracker.add(infos(&[tx(0)])).await.unwrap();

    let snapshot = step_to(&chain, &tracker, 5).await;
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);
    assert_eq!(snapshot.last_fork, 0);

    let snapshot = step_to(&chain, &tracker, 6).await;
    assert_eq!(snapshot.hashes(TxState::Pending), vec![tx(0)]);
    assert_eq!(snapshot.last_fork, 6);
    assert!(!snapshot.receipts.contains_key(&tx(0)));

    let snapshot = step_to(&chain, &tracker, 8).await;
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);
    assert_eq!(snapshot.receipts[&tx(0)].block_number, 8);

    let snapshot = step_to(&chain, &tracker, 13).await;
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);
    let snapshot = step_to(&chain, &tracker, 14).await;
    assert_eq!(snapshot.hashes(TxState::Confirmed), vec![tx(0)]);
    assert_eq!(snapshot.last_fork, 6);
}

#[tokio::test]
async fn test_unknown_hashes_are_reported() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;

    let errors = tracker.add(infos(&[tx(0), tx(9)])).await.unwrap();
    assert_eq!(
        errors,
        vec![IngestionError {
            hash: tx(9),
            kind: IngestionErrorKind::NotFound,
        }]
    );

    let errors = tracker.reconcile(Some(vec![tx(8)])).await.unwrap();
    assert_eq!(errors[0].kind, IngestionErrorKind::Unrequested);

    // A replaced transaction disappears from the node.
    chain.remove_transaction(&tx(0));
    let errors = tracker.reconcile(None).await.unwrap();
    assert_eq!(errors[0].hash, tx(0));
    assert_eq!(errors[0].kind, IngestionErrorKind::NotFound);

    let snapshot = tracker.snapshot();
    assert!(snapshot.accounts.is_empty());
    assert!(snapshot.info.contains_key(&tx(0)));
    assert!(matches!(
        tracker.state_of(&tx(0)),
        Err(TrackerError::UnknownTransaction(_))
    ));
    assert_eq!(tracker.watcher_state().await, WatcherState::Idle);
}

#[tokio::test]
async fn test_add_merges_info() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;

    tracker
        .add(vec![TxInfo::new(tx(0)).with("label", "swap")])
        .await
        .unwrap();
    let batches = chain.calls(MockMethod::Batch);
    tracker
        .add(vec![TxInfo::new(tx(0)).with("note", "retry")])
        .await
        .unwrap();

    let info = &tracker.snapshot().info[&tx(0)];
    assert_eq!(info.metadata["label"], "swap");
    assert_eq!(info.metadata["note"], "retry");
    // The object is cached, so the second add fetches nothing.
    assert_eq!(chain.calls(MockMethod::Batch), batches);
}

#[tokio::test]
async fn test_rpc_failure_is_recorded() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;

    chain.fail(MockMethod::Batch, RpcError::Transport("connection refused".to_string()));
    let errors = tracker.add(infos(&[tx(0)])).await.unwrap();
    assert!(errors.is_empty());
    let snapshot = tracker.snapshot();
    assert!(snapshot.error.as_deref().unwrap().contains("connection refused"));
    assert!(snapshot.accounts.is_empty());

    chain.recover(MockMethod::Batch);
    tracker.reconcile(Some(vec![tx(0)])).await.unwrap();
    assert_eq!(tracker.state_of(&tx(0)).unwrap(), Some(TxState::Pending));
}

#[tokio::test]
async fn test_subscription_error_keeps_watching() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;
    tracker.add(infos(&[tx(0)])).await.unwrap();

    chain.fail_subscribers(RpcError::Transport("stream reset".to_string()));
    let snapshot = wait_until(&tracker, |s| s.error.is_some()).await;
    assert!(snapshot.error.as_deref().unwrap().contains("stream reset"));
    assert_eq!(tracker.watcher_state().await, WatcherState::Watching);

    let snapshot = step(&chain, &tracker).await;
    assert_eq!(snapshot.block_number, 1);
}

#[tokio::test]
async fn test_snapshot_survives_reconnect() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0).received_at(1))
        .with_transaction(MockTransaction::new(tx(1), bob(), 3));
    let store = MemoryStore::new();
    let tracker = connect(&chain, &store, TrackerConfig::default()).await;
    tracker
        .add(vec![TxInfo::new(tx(0)).with("label", "mint"), TxInfo::new(tx(1))])
        .await
        .unwrap();
    step(&chain, &tracker).await;
    let before = tracker.snapshot();
    tracker.shutdown().await;

    let blob = store.get(&genesis_key(&chain.genesis())).await.unwrap().unwrap();
    assert_eq!(LedgerSnapshot::from_blob(&blob).unwrap().accounts, before.accounts);

    let restored = connect(&chain, &store, TrackerConfig::default()).await;
    let after = restored.snapshot();
    assert_eq!(after.accounts, before.accounts);
    assert_eq!(after.info, before.info);
    assert_eq!(after.hashes(TxState::Received), vec![tx(0)]);
    assert_eq!(after.hashes(TxState::Pending), vec![tx(1)]);
    assert_eq!(restored.watcher_state().await, WatcherState::Watching);
}

#[tokio::test]
async fn test_corrupt_snapshot_is_rejected() {
    let chain = MockChain::new();
    let store = MemoryStore::new();
    store
        .set(&genesis_key(&chain.genesis()), "{\"accounts\":".to_string())
        .await
        .unwrap();

    let result =
        TxTracker::connect(Arc::new(chain), Arc::new(store), TrackerConfig::default()).await;

    assert!(matches!(result, Err(TrackerError::Snapshot(_))));
}

#[tokio::test]
async fn test_missing_genesis_fails_connect() {
    let chain = MockChain::new();
    chain.fail(MockMethod::GetBlock, RpcError::Transport("down".to_string()));

    let result = TxTracker::connect(
        Arc::new(chain),
        Arc::new(MemoryStore::new()),
        TrackerConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(TrackerError::Rpc(_))));
}

#[tokio::test]
async fn test_clear_forgets_chain() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0));
    let store = MemoryStore::new();
    let tracker = connect(&chain, &store, TrackerConfig::default()).await;
    tracker.add(infos(&[tx(0)])).await.unwrap();
    store.set("0xother", "{}".to_string()).await.unwrap();

    tracker.clear().await.unwrap();

    let snapshot = tracker.snapshot();
    assert!(snapshot.accounts.is_empty());
    assert!(snapshot.info.is_empty());
    assert_eq!(tracker.watcher_state().await, WatcherState::Idle);
    let blob = store.get(&genesis_key(&chain.genesis())).await.unwrap().unwrap();
    assert!(LedgerSnapshot::from_blob(&blob).unwrap().is_empty());
    assert!(store.get("0xother").await.unwrap().is_some());

    tracker.clear_all().await.unwrap();
    assert!(store.get("0xother").await.unwrap().is_none());
}

#[tokio::test]
async fn test_clear_pending_keeps_received() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0).received_at(1))
        .with_transaction(MockTransaction::new(tx(1), alice(), 1));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;
    tracker.add(infos(&[tx(0), tx(1)])).await.unwrap();
    step(&chain, &tracker).await;

    let removed = tracker.clear_pending().await.unwrap();

    assert_eq!(removed, vec![tx(1)]);
    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);
    assert!(!snapshot.info.contains_key(&tx(1)));
    assert!(snapshot.info.contains_key(&tx(0)));
    assert_eq!(tracker.watcher_state().await, WatcherState::Watching);
}

#[tokio::test]
async fn test_stuck_pending_expires() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0));
    let config = TrackerConfig::default().with_max_pending_blocks(3);
    let tracker = connect(&chain, &MemoryStore::new(), config).await;
    tracker.add(infos(&[tx(0)])).await.unwrap();

    let snapshot = step_to(&chain, &tracker, 3).await;
    assert_eq!(snapshot.hashes(TxState::Pending), vec![tx(0)]);

    let snapshot = step_to(&chain, &tracker, 4).await;
    assert_eq!(snapshot.hashes(TxState::Failed), vec![tx(0)]);
    assert_eq!(tracker.watcher_state().await, WatcherState::Idle);
}

#[tokio::test]
async fn test_prune_policy_forgets_evicted() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0).received_at(1));
    let config = TrackerConfig::default()
        .with_confirm_count(0)
        .with_buffer_size(0)
        .with_cache_policy(CachePolicy::PruneEvicted);
    let tracker = connect(&chain, &MemoryStore::new(), config).await;
    tracker.add(infos(&[tx(0)])).await.unwrap();

    let snapshot = step_to(&chain, &tracker, 1).await;
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);

    let snapshot = step_to(&chain, &tracker, 2).await;
    assert!(snapshot.accounts.is_empty());
    assert!(snapshot.objects.is_empty());
    assert!(snapshot.info.is_empty());
    assert!(matches!(
        tracker.state_of(&tx(0)),
        Err(TrackerError::UnknownTransaction(_))
    ));
}

#[tokio::test]
async fn test_revisions_reach_listeners() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = tracker
        .on_change(move |s| sink.lock().unwrap().push(s.revision))
        .await;

    tracker.add(infos(&[tx(0)])).await.unwrap();
    tracker.reconcile(None).await.unwrap();
    assert!(tracker.unsubscribe(id).await);
    tracker.reconcile(None).await.unwrap();

    let revisions = seen.lock().unwrap().clone();
    assert_eq!(revisions.len(), 2);
    assert!(revisions[0] < revisions[1]);
}

#[tokio::test]
async fn test_shutdown_closes_tracker() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;
    tracker.add(infos(&[tx(0)])).await.unwrap();

    tracker.shutdown().await;

    assert_eq!(tracker.watcher_state().await, WatcherState::Idle);
    assert!(matches!(tracker.add(infos(&[tx(1)])).await, Err(TrackerError::Closed)));
    assert!(matches!(tracker.clear().await, Err(TrackerError::Closed)));
    assert_eq!(tracker.state_of(&tx(0)).unwrap(), Some(TxState::Pending));
}

#[tokio::test]
async fn test_add_records_head_reached_while_idle() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0))
        .with_transaction(MockTransaction::new(tx(1), bob(), 0).received_at(40));
    let config = TrackerConfig::default()
        .with_confirm_count(12)
        .with_max_pending_blocks(5);
    let tracker = connect(&chain, &MemoryStore::new(), config).await;
    assert_eq!(tracker.watcher_state().await, WatcherState::Idle);
    chain.advance_to(60);

    tracker.add(infos(&[tx(0), tx(1)])).await.unwrap();

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.block_number, 60);
    assert_eq!(snapshot.block_hash, Some(chain.head_block().hash));
    assert_eq!(snapshot.hashes(TxState::Confirmed), vec![tx(1)]);
    assert_eq!(snapshot.hashes(TxState::Pending), vec![tx(0)]);

    let snapshot = step(&chain, &tracker).await;
    assert_eq!(snapshot.last_fork, 0);
    assert_eq!(snapshot.hashes(TxState::Pending), vec![tx(0)]);

    let snapshot = step_to(&chain, &tracker, 65).await;
    assert_eq!(snapshot.hashes(TxState::Pending), vec![tx(0)]);
    let snapshot = step_to(&chain, &tracker, 66).await;
    assert_eq!(snapshot.hashes(TxState::Failed), vec![tx(0)]);
    assert_eq!(snapshot.last_fork, 0);
}

#[tokio::test]
async fn test_extending_block_refetches_only_pending() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0).received_at(1))
        .with_transaction(MockTransaction::new(tx(1), bob(), 0));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;
    tracker.add(infos(&[tx(0), tx(1)])).await.unwrap();

    let snapshot = step(&chain, &tracker).await;
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);
    assert_eq!(snapshot.hashes(TxState::Pending), vec![tx(1)]);
    let receipts = chain.calls(MockMethod::GetReceipt);

    let snapshot = step(&chain, &tracker).await;
    assert_eq!(chain.calls(MockMethod::GetReceipt), receipts + 1);
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);
    assert_eq!(snapshot.hashes(TxState::Pending), vec![tx(1)]);
    assert_eq!(snapshot.last_fork, 0);
}

#[tokio::test]
async fn test_fork_returns_dropped_to_pending() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0).received_at(2))
        .with_transaction(MockTransaction::new(tx(1), alice(), 0))
        .fork_at(4, 1);
    let config = TrackerConfig::default().with_confirm_count(5);
    let tracker = connect(&chain, &MemoryStore::new(), config).await;
    tracker.add(infos(&[tx(0), tx(1)])).await.unwrap();

    let snapshot = step_to(&chain, &tracker, 3).await;
    assert_eq!(snapshot.hashes(TxState::Received), vec![tx(0)]);
    assert_eq!(snapshot.hashes(TxState::Dropped), vec![tx(1)]);

    let snapshot = step_to(&chain, &tracker, 4).await;
    let mut pending = snapshot.hashes(TxState::Pending);
    pending.sort();
    assert_eq!(pending, vec![tx(0), tx(1)]);
    assert!(snapshot.hashes(TxState::Dropped).is_empty());
    assert!(snapshot.receipts.is_empty());
    assert_eq!(snapshot.last_fork, 4);
}

#[tokio::test]
async fn test_add_fetches_repeated_hash_once() {
    let chain = MockChain::new()
        .with_transaction(MockTransaction::new(tx(0), alice(), 0))
        .with_transaction(MockTransaction::new(tx(1), alice(), 1));
    let tracker = connect(&chain, &MemoryStore::new(), TrackerConfig::default()).await;

    tracker
        .add(infos(&[tx(1), tx(0), tx(1), tx(0)]))
        .await
        .unwrap();

    assert_eq!(chain.calls(MockMethod::GetTransaction), 2);
    assert_eq!(tracker.snapshot().hashes(TxState::Pending), vec![tx(0), tx(1)]);
}
