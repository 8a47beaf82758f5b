//! Transaction tracker for one chain connection.
//!
//! A [`TxTracker`] mirrors the lifecycle of a set of transaction hashes.
//! Every mutation runs as a pass under the pass lock:
//! 1. Fetch objects and receipts with no lock held
//! 2. Apply them and sweep the ledger under the state lock
//! 3. Persist the ledger, start or stop the block watcher
//! 4. Publish one new revision
//!
//! Block notifications from the watcher run the same pass for the pending
//! hashes, or for every active hash when the block does not extend the
//! recorded one.

use crate::config::TrackerConfig;
use crate::error::{IngestionError, TrackerError, TrackerResult};
use crate::lifecycle::sweep;
use crate::publisher::StatePublisher;
use crate::state::{TrackerSnapshot, TrackerState};
use crate::sync::{BlockHandler, BlockWatcher, WatcherState, reconciler};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use txmirror_data::SnapshotStore;
use txmirror_domain::value_objects::genesis_key;
use txmirror_domain::{
    Block, BlockHash, BlockId, ChainPointer, LedgerSnapshot, TxHash, TxInfo, TxState,
};
use txmirror_protocols::{ChainRpc, RpcError};
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Block that a pass records before applying its results.
struct Head {
    block: Block,
    fork: bool,
}

struct TrackerInner {
    me: Weak<TrackerInner>,
    rpc: Arc<dyn ChainRpc>,
    store: Arc<dyn SnapshotStore>,
    config: TrackerConfig,
    /// Store key of the connected chain.
    key: String,
    state: Mutex<TrackerState>,
    /// Serializes passes and resets.
    pass_lock: Mutex<()>,
    watcher: BlockWatcher,
    publisher: StatePublisher,
    closed: AtomicBool,
}

/// Tracks transactions on one chain. Clones share the same tracker.
#[derive(Clone)]
pub struct TxTracker {
    inner: Arc<TrackerInner>,
}

impl TxTracker {
    /// Connects to the chain served by `rpc`.
    ///
    /// Loads the snapshot persisted under the chain's genesis hash, records
    /// the current head and reconciles every active hash once.
    ///
    /// # Errors
    /// Fails if the genesis or head block cannot be fetched, if the store
    /// cannot be read or if the persisted snapshot is rejected.
    pub async fn connect(
        rpc: Arc<dyn ChainRpc>,
        store: Arc<dyn SnapshotStore>,
        config: TrackerConfig,
    ) -> TrackerResult<Self> {
        let genesis = fetch_block(rpc.as_ref(), BlockId::Number(0)).await?;
        let key = genesis_key(&genesis.hash);
        let tracked = match store.get(&key).await? {
            Some(blob) => LedgerSnapshot::from_blob(&blob)?,
            None => LedgerSnapshot::default(),
        };

        let number = rpc.get_block_number().await?;
        let head = fetch_block(rpc.as_ref(), BlockId::Number(number)).await?;
        let mut pointer = ChainPointer::new(genesis.hash);
        pointer.record(&head);

        let state = TrackerState::new(tracked, pointer);
        let publisher = StatePublisher::new(state.view());
        let inner = Arc::new_cyclic(|me| TrackerInner {
            me: me.clone(),
            rpc,
            store,
            config,
            key,
            state: Mutex::new(state),
            pass_lock: Mutex::new(()),
            watcher: BlockWatcher::new(),
            publisher,
            closed: AtomicBool::new(false),
        });
        info!(genesis = %inner.key, block = head.number, "Tracker connected");

        {
            let _pass = inner.pass_lock.lock().await;
            let hashes = inner.state.lock().await.tracked.accounts.active_hashes();
            let ingestion = inner.run_pass(hashes, None, Vec::new()).await;
            if !ingestion.is_empty() {
                warn!(count = ingestion.len(), "Tracked hashes unknown to node at connect");
            }
        }
        Ok(Self { inner })
    }

    /// Starts tracking `infos`.
    ///
    /// Metadata is merged into the Info of hashes already known. Hashes with
    /// no cached transaction object are fetched; the call returns once that
    /// batch has been applied.
    ///
    /// # Errors
    /// Returns `TrackerError::Closed` after [`TxTracker::shutdown`].
    pub async fn add(&self, infos: Vec<TxInfo>) -> TrackerResult<Vec<IngestionError>> {
        self.ensure_open()?;
        let _pass = self.inner.pass_lock.lock().await;

        let hashes = {
            let mut state = self.inner.state.lock().await;
            let mut seen = HashSet::new();
            let mut fresh = Vec::new();
            for info in infos {
                let hash = info.hash;
                state
                    .tracked
                    .info
                    .entry(hash)
                    .or_insert_with(|| TxInfo::new(hash))
                    .merge(info);
                if !state.tracked.objects.contains_key(&hash) && seen.insert(hash) {
                    fresh.push(hash);
                }
            }
            fresh
        };
        debug!(fresh = hashes.len(), "Adding transactions");

        Ok(self.inner.run_requested_pass(hashes).await)
    }

    /// Reconciles `hashes`, or every active hash when `None`.
    ///
    /// # Errors
    /// Returns `TrackerError::Closed` after [`TxTracker::shutdown`].
    pub async fn reconcile(
        &self,
        hashes: Option<Vec<TxHash>>,
    ) -> TrackerResult<Vec<IngestionError>> {
        self.ensure_open()?;
        let _pass = self.inner.pass_lock.lock().await;
        let hashes = match hashes {
            Some(hashes) => hashes,
            None => self.inner.state.lock().await.tracked.accounts.active_hashes(),
        };
        Ok(self.inner.run_requested_pass(hashes).await)
    }

    /// Forgets everything tracked on this chain. The chain's entry is
    /// persisted as empty.
    ///
    /// # Errors
    /// Returns `TrackerError::Closed` after [`TxTracker::shutdown`].
    pub async fn clear(&self) -> TrackerResult<()> {
        self.ensure_open()?;
        let _pass = self.inner.pass_lock.lock().await;
        self.inner.watcher.stop().await;
        self.inner.reset().await;
        info!(genesis = %self.inner.key, "Tracker cleared");
        self.inner.settle(Vec::new()).await;
        Ok(())
    }

    /// Forgets everything tracked and wipes the store for every chain.
    ///
    /// # Errors
    /// `TrackerError::Closed` after shutdown, `TrackerError::Store` if the
    /// store could not be wiped. The in-memory state is cleared either way.
    pub async fn clear_all(&self) -> TrackerResult<()> {
        self.ensure_open()?;
        let _pass = self.inner.pass_lock.lock().await;
        self.inner.watcher.stop().await;
        self.inner.reset().await;

        let wiped = self.inner.store.clear().await;
        let mut errors = Vec::new();
        if let Err(e) = &wiped {
            warn!(error = %e, "Failed to wipe store");
            errors.push(e.to_string());
        }
        info!("Store cleared");
        self.inner.settle(errors).await;
        Ok(wiped?)
    }

    /// Removes every pending transaction and its cached data. Returns the
    /// removed hashes.
    ///
    /// # Errors
    /// Returns `TrackerError::Closed` after [`TxTracker::shutdown`].
    pub async fn clear_pending(&self) -> TrackerResult<Vec<TxHash>> {
        self.ensure_open()?;
        let _pass = self.inner.pass_lock.lock().await;
        let removed: Vec<TxHash> = {
            let mut state = self.inner.state.lock().await;
            let records = state.tracked.accounts.remove_state(TxState::Pending);
            for record in &records {
                state.tracked.forget(&record.hash);
            }
            records.into_iter().map(|record| record.hash).collect()
        };
        info!(count = removed.len(), "Cleared pending transactions");
        self.inner.settle(Vec::new()).await;
        Ok(removed)
    }

    /// Current state of `hash` in the latest published snapshot. `None`
    /// once the hash left the ledger.
    ///
    /// # Errors
    /// `TrackerError::UnknownTransaction` if no transaction object is cached
    /// for `hash`.
    pub fn state_of(&self, hash: &TxHash) -> TrackerResult<Option<TxState>> {
        let snapshot = self.snapshot();
        if !snapshot.objects.contains_key(hash) {
            return Err(TrackerError::UnknownTransaction(*hash));
        }
        Ok(snapshot.state_of(hash))
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TrackerSnapshot> {
        self.inner.publisher.current()
    }

    /// Receiver observing every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<TrackerSnapshot>> {
        self.inner.publisher.subscribe()
    }

    /// Registers a callback run on every published snapshot.
    pub async fn on_change<F>(&self, listener: F) -> Uuid
    where
        F: Fn(&TrackerSnapshot) + Send + Sync + 'static,
    {
        self.inner.publisher.on_change(listener).await
    }

    pub async fn unsubscribe(&self, id: Uuid) -> bool {
        self.inner.publisher.unsubscribe(id).await
    }

    pub async fn watcher_state(&self) -> WatcherState {
        self.inner.watcher.state().await
    }

    #[must_use]
    pub fn genesis(&self) -> BlockHash {
        self.snapshot().genesis
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Stops the block watcher. Later mutations fail with
    /// `TrackerError::Closed`.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.watcher.stop().await;
        info!(genesis = %self.inner.key, "Tracker shut down");
    }

    fn ensure_open(&self) -> TrackerResult<()> {
        if self.inner.is_closed() {
            return Err(TrackerError::Closed);
        }
        Ok(())
    }
}

impl TrackerInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn handler(&self) -> Weak<dyn BlockHandler> {
        self.me.clone()
    }

    /// Runs a pass requested by the caller rather than by a block
    /// notification. The caller holds the pass lock.
    ///
    /// No notification moves the recorded block while the watcher is idle,
    /// so the pass first records the node's current head.
    async fn run_requested_pass(&self, hashes: Vec<TxHash>) -> Vec<IngestionError> {
        let mut errors = Vec::new();
        let mut head = None;
        if self.watcher.state().await == WatcherState::Idle {
            match self.fetch_head().await {
                Ok(block) => head = Some(Head { block, fork: false }),
                Err(e) => {
                    warn!(error = %e, "Failed to refresh head block");
                    errors.push(e.to_string());
                }
            }
        }
        self.run_pass(hashes, head, errors).await
    }

    async fn fetch_head(&self) -> TrackerResult<Block> {
        let number = self.rpc.get_block_number().await?;
        fetch_block(self.rpc.as_ref(), BlockId::Number(number)).await
    }

    /// Runs one reconciliation pass. The caller holds the pass lock.
    async fn run_pass(
        &self,
        hashes: Vec<TxHash>,
        head: Option<Head>,
        mut errors: Vec<String>,
    ) -> Vec<IngestionError> {
        let report = reconciler::fetch(self.rpc.as_ref(), &hashes).await;

        let ingestion = {
            let mut state = self.state.lock().await;
            if let Some(head) = head {
                state.pointer.record(&head.block);
                if head.fork {
                    state.pointer.last_fork_block_number = head.block.number;
                }
            }
            let current = state.pointer.block_number;

            let applied = reconciler::apply(&mut state.tracked, report, current);
            let swept = sweep(&mut state.tracked, current, &self.config);
            errors.extend(applied.rpc_errors.iter().map(ToString::to_string));
            errors.extend(applied.ledger_errors.iter().map(ToString::to_string));
            errors.extend(swept.errors.iter().map(ToString::to_string));

            debug!(
                block = current,
                inserted = applied.inserted.len(),
                received = applied.received.len(),
                reverted = applied.reverted.len(),
                confirmed = swept.confirmed.len(),
                failed = swept.failed.len() + swept.expired.len(),
                "Pass applied"
            );
            applied.ingestion_errors
        };
        for err in &ingestion {
            debug!(hash = %err.hash, kind = ?err.kind, "Ingestion error");
        }

        self.settle(errors).await;
        ingestion
    }

    /// Persists the ledger, starts or stops the watcher and publishes a new
    /// revision carrying `errors`. The caller holds the pass lock.
    async fn settle(&self, mut errors: Vec<String>) {
        let (blob, active) = {
            let state = self.state.lock().await;
            (state.tracked.to_blob(), state.tracked.accounts.has_active())
        };

        match blob {
            Ok(blob) => {
                if let Err(e) = self.store.set(&self.key, blob).await {
                    warn!(key = %self.key, error = %e, "Failed to persist snapshot");
                    errors.push(e.to_string());
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to encode snapshot");
                errors.push(e.to_string());
            }
        }

        if active && !self.is_closed() {
            if let Err(e) = self.watcher.start(self.rpc.clone(), self.handler()).await {
                warn!(error = %e, "Failed to start block watcher");
                errors.push(e.to_string());
            }
        } else {
            self.watcher.stop().await;
        }

        self.publish(errors).await;
    }

    /// Records `errors` and publishes the next revision. The caller holds
    /// the pass lock.
    async fn publish(&self, errors: Vec<String>) {
        let snapshot = {
            let mut state = self.state.lock().await;
            for err in errors {
                state.record_error(err);
            }
            state.revision += 1;
            state.view()
        };
        self.publisher.publish(snapshot).await;
    }

    async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.tracked.clear();
        state.error = None;
    }
}

#[async_trait]
impl BlockHandler for TrackerInner {
    async fn on_new_block(&self, hash: BlockHash, cancel: &CancellationToken) {
        let _pass = self.pass_lock.lock().await;
        if cancel.is_cancelled() || self.is_closed() {
            debug!(hash = %hash, "Ignoring block after watch stopped");
            return;
        }

        let block = match fetch_block(self.rpc.as_ref(), BlockId::Hash(hash)).await {
            Ok(block) => block,
            Err(e) => {
                warn!(hash = %hash, error = %e, "Failed to fetch new block");
                self.publish(vec![e.to_string()]).await;
                return;
            }
        };

        let (hashes, fork) = {
            let state = self.state.lock().await;
            if state.pointer.is_recorded(&block) {
                debug!(hash = %hash, "Duplicate block notification");
                return;
            }
            let fork = state.pointer.is_fork(&block);
            let hashes = if fork {
                state.tracked.accounts.active_hashes()
            } else {
                state.tracked.accounts.hashes_in(&[TxState::Pending])
            };
            (hashes, fork)
        };
        if fork {
            info!(block = block.number, hash = %block.hash, "Fork detected");
        }
        debug!(block = block.number, hashes = hashes.len(), "New block");

        self.run_pass(hashes, Some(Head { block, fork }), Vec::new())
            .await;
    }

    async fn on_watch_error(&self, err: RpcError) {
        let _pass = self.pass_lock.lock().await;
        warn!(error = %err, "Block subscription error");
        self.publish(vec![err.to_string()]).await;
    }
}

async fn fetch_block(rpc: &dyn ChainRpc, id: BlockId) -> TrackerResult<Block> {
    rpc.get_block(id)
        .await?
        .ok_or(TrackerError::BlockNotFound(id))
}
