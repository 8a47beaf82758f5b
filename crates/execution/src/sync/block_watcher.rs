//! New-block subscription driving reconciliation.

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use txmirror_domain::BlockHash;
use txmirror_protocols::{BlockSubscription, ChainRpc, RpcError, RpcResult};

/// Receiver of block notifications.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    /// Called for every new block hash. `cancel` fires once the watch that
    /// delivered the hash is stopped.
    async fn on_new_block(&self, hash: BlockHash, cancel: &CancellationToken);

    /// Called when the subscription reports an error. Watching continues.
    async fn on_watch_error(&self, err: RpcError);
}

/// Whether a subscription is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
}

struct ActiveWatch {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveWatch {
    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

/// Owns at most one block subscription and the task consuming it.
///
/// The handler is held weakly so a watcher never keeps its owner alive.
#[derive(Default)]
pub struct BlockWatcher {
    active: Mutex<Option<ActiveWatch>>,
}

impl BlockWatcher {
    /// Creates an idle watcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts watching unless already watching. Returns whether a new
    /// subscription was opened.
    ///
    /// # Errors
    /// Returns the subscription error; the watcher stays idle.
    pub async fn start(
        &self,
        rpc: Arc<dyn ChainRpc>,
        handler: Weak<dyn BlockHandler>,
    ) -> RpcResult<bool> {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(ActiveWatch::is_running) {
            return Ok(false);
        }

        let subscription = rpc.subscribe_new_blocks().await?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_watch(subscription, handler, cancel.clone()));
        *active = Some(ActiveWatch { cancel, task });
        info!("Block watcher started");
        Ok(true)
    }

    /// Stops watching. Returns whether a running watch was stopped.
    ///
    /// Does not wait for the watch task, so it is safe to call from a
    /// handler running on that task.
    pub async fn stop(&self) -> bool {
        let Some(watch) = self.active.lock().await.take() else {
            return false;
        };
        let was_running = watch.is_running();
        watch.cancel.cancel();
        if was_running {
            info!("Block watcher stopped");
        }
        was_running
    }

    pub async fn state(&self) -> WatcherState {
        match self.active.lock().await.as_ref() {
            Some(watch) if watch.is_running() => WatcherState::Watching,
            _ => WatcherState::Idle,
        }
    }
}

impl Drop for BlockWatcher {
    fn drop(&mut self) {
        if let Some(watch) = self.active.get_mut().take() {
            watch.cancel.cancel();
        }
    }
}

async fn run_watch(
    mut subscription: BlockSubscription,
    handler: Weak<dyn BlockHandler>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = subscription.next() => next,
        };
        let Some(handler) = handler.upgrade() else {
            break;
        };
        match next {
            Some(Ok(hash)) => handler.on_new_block(hash, &cancel).await,
            Some(Err(e)) => handler.on_watch_error(e).await,
            None => {
                handler.on_watch_error(RpcError::SubscriptionClosed).await;
                break;
            }
        }
    }
    debug!("Block watch task finished");
}
