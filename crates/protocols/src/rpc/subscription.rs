use crate::error::RpcResult;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use txmirror_domain::BlockHash;

/// Stream of new block hashes.
///
/// The producer stops once the token is cancelled or the receiver is
/// dropped. Dropping the subscription cancels it.
#[derive(Debug)]
pub struct BlockSubscription {
    receiver: mpsc::UnboundedReceiver<RpcResult<BlockHash>>,
    cancel: CancellationToken,
}

impl BlockSubscription {
    /// Wraps a receiver fed by a producer watching `cancel`.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<RpcResult<BlockHash>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { receiver, cancel }
    }

    /// Waits for the next block hash or producer error.
    ///
    /// Returns `None` once stopped or once the producer is gone.
    pub async fn next(&mut self) -> Option<RpcResult<BlockHash>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.receiver.recv() => item,
        }
    }

    /// Stops the producer. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for BlockSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
