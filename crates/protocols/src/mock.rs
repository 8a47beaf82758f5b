//! Deterministic in-memory chain.
//!
//! Blocks are produced only when the caller advances the chain, so tests can
//! step through receptions, confirmations and reorganizations block by block.
//! Each block belongs to a chain id; a fork point switches the canonical chain
//! id from a given block number onwards, after which receipts are looked up by
//! the new chain id.

use crate::error::{RpcError, RpcResult};
use crate::rpc::{BlockSubscription, ChainRpc, RpcRequest, RpcResponse};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use txmirror_domain::{
    Address, Block, BlockHash, BlockId, TransactionObject, TransactionReceipt, TxHash,
};

const BASE_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME: u64 = 12;

/// RPC methods whose failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockMethod {
    GetTransaction,
    GetReceipt,
    GetBlock,
    GetBlockNumber,
    Subscribe,
    Batch,
}

/// Scripted transaction known to the mock chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub nonce: u64,
    /// Block number at which the transaction is mined, per chain id.
    pub receptions: HashMap<u64, u64>,
}

impl MockTransaction {
    /// A broadcast transaction that is never mined.
    pub fn new(hash: TxHash, from: Address, nonce: u64) -> Self {
        Self {
            hash,
            from,
            nonce,
            receptions: HashMap::new(),
        }
    }

    /// Mined at `block` on the original chain.
    #[must_use]
    pub fn received_at(self, block: u64) -> Self {
        self.received_on(0, block)
    }

    /// Mined at `block` on chain `chain_id`.
    #[must_use]
    pub fn received_on(mut self, chain_id: u64, block: u64) -> Self {
        self.receptions.insert(chain_id, block);
        self
    }
}

#[derive(Debug)]
struct Subscriber {
    sender: mpsc::UnboundedSender<RpcResult<BlockHash>>,
    cancel: CancellationToken,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.sender.is_closed()
    }
}

#[derive(Debug, Default)]
struct MockState {
    chain_id: u64,
    /// Canonical block per number.
    canonical: Vec<Block>,
    /// Every block ever produced, orphans included.
    blocks: HashMap<BlockHash, Block>,
    forks: BTreeMap<u64, u64>,
    transactions: HashMap<TxHash, MockTransaction>,
    failures: HashMap<MockMethod, RpcError>,
    calls: HashMap<MockMethod, usize>,
    subscribers: Vec<Subscriber>,
}

impl MockState {
    fn head(&self) -> u64 {
        // Genesis is always present.
        self.canonical.len().saturating_sub(1) as u64
    }

    fn enter(&mut self, method: MockMethod) -> RpcResult<()> {
        *self.calls.entry(method).or_default() += 1;
        match self.failures.get(&method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn push_block(&mut self, block: Block) {
        let number = block.number as usize;
        self.blocks.insert(block.hash, block.clone());
        if number < self.canonical.len() {
            self.canonical[number] = block;
        } else {
            self.canonical.push(block);
        }
    }
}

/// Block hash of block `number` on chain `chain_id`.
#[must_use]
pub fn mock_block_hash(chain_id: u64, number: u64) -> BlockHash {
    BlockHash::from_low_u64_be(((chain_id + 1) << 32) | number)
}

fn mock_block(chain_id: u64, number: u64) -> Block {
    let parent = number.saturating_sub(1);
    // Block one always builds on the shared genesis.
    let parent_chain = if parent == 0 { 0 } else { chain_id };
    Block {
        number,
        hash: mock_block_hash(chain_id, number),
        parent_hash: mock_block_hash(parent_chain, parent),
        timestamp: BASE_TIMESTAMP + number * BLOCK_TIME,
    }
}

/// In-memory `ChainRpc` implementation. Clones share the same chain.
#[derive(Debug, Clone)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// Creates a chain holding only its genesis block.
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.push_block(mock_block(0, 0));
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a scripted transaction.
    #[must_use]
    pub fn with_transaction(self, tx: MockTransaction) -> Self {
        self.add_transaction(tx);
        self
    }

    /// Switches the canonical chain to `chain_id` from block `number` on.
    #[must_use]
    pub fn fork_at(self, number: u64, chain_id: u64) -> Self {
        self.lock().forks.insert(number, chain_id);
        self
    }

    /// Adds or replaces a scripted transaction.
    pub fn add_transaction(&self, tx: MockTransaction) {
        self.lock().transactions.insert(tx.hash, tx);
    }

    /// Forgets a transaction, as if the node never saw it.
    pub fn remove_transaction(&self, hash: &TxHash) {
        self.lock().transactions.remove(hash);
    }

    /// Produces the next block and notifies subscribers. Returns its hash.
    pub fn advance(&self) -> BlockHash {
        let mut state = self.lock();
        let number = state.head() + 1;
        if let Some(chain_id) = state.forks.get(&number).copied() {
            state.chain_id = chain_id;
            debug!(number, chain_id, "mock chain reorganized");
            if number >= 2 {
                // The new branch replaces the previous block.
                state.push_block(mock_block(chain_id, number - 1));
            }
        }
        let block = mock_block(state.chain_id, number);
        let hash = block.hash;
        state.push_block(block);

        state.subscribers.retain(Subscriber::is_live);
        for subscriber in &state.subscribers {
            // Closed receivers are pruned on the next advance.
            let _ = subscriber.sender.send(Ok(hash));
        }
        hash
    }

    /// Advances until the head is block `number`.
    pub fn advance_to(&self, number: u64) {
        while self.head() < number {
            self.advance();
        }
    }

    /// Number of the latest block.
    #[must_use]
    pub fn head(&self) -> u64 {
        self.lock().head()
    }

    /// Latest block.
    #[must_use]
    pub fn head_block(&self) -> Block {
        let state = self.lock();
        state.canonical[state.canonical.len() - 1].clone()
    }

    /// Hash of the genesis block.
    #[must_use]
    pub fn genesis(&self) -> BlockHash {
        mock_block_hash(0, 0)
    }

    /// Makes every call of `method` fail with `err` until recovered.
    pub fn fail(&self, method: MockMethod, err: RpcError) {
        self.lock().failures.insert(method, err);
    }

    /// Removes an injected failure.
    pub fn recover(&self, method: MockMethod) {
        self.lock().failures.remove(&method);
    }

    /// Delivers an error to every live subscriber.
    pub fn fail_subscribers(&self, err: RpcError) {
        let mut state = self.lock();
        state.subscribers.retain(Subscriber::is_live);
        for subscriber in &state.subscribers {
            let _ = subscriber.sender.send(Err(err.clone()));
        }
    }

    /// Number of calls made to `method`, failed ones included.
    #[must_use]
    pub fn calls(&self, method: MockMethod) -> usize {
        self.lock().calls.get(&method).copied().unwrap_or(0)
    }

    /// Number of subscriptions that are still live.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(Subscriber::is_live);
        state.subscribers.len()
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn get_transaction(&self, hash: TxHash) -> RpcResult<Option<TransactionObject>> {
        let mut state = self.lock();
        state.enter(MockMethod::GetTransaction)?;
        Ok(state
            .transactions
            .get(&hash)
            .map(|tx| TransactionObject::new(tx.hash, tx.nonce, tx.from)))
    }

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> RpcResult<Option<TransactionReceipt>> {
        let mut state = self.lock();
        state.enter(MockMethod::GetReceipt)?;
        let head = state.head();
        let chain_id = state.chain_id;
        Ok(state.transactions.get(&hash).and_then(|tx| {
            let block = *tx.receptions.get(&chain_id)?;
            (block <= head).then(|| {
                TransactionReceipt::new(hash, block)
                    .with_block_hash(mock_block_hash(chain_id, block))
            })
        }))
    }

    async fn get_block(&self, id: BlockId) -> RpcResult<Option<Block>> {
        let mut state = self.lock();
        state.enter(MockMethod::GetBlock)?;
        Ok(match id {
            BlockId::Number(n) => state.canonical.get(n as usize).cloned(),
            BlockId::Hash(hash) => state.blocks.get(&hash).cloned(),
        })
    }

    async fn get_block_number(&self) -> RpcResult<u64> {
        let mut state = self.lock();
        state.enter(MockMethod::GetBlockNumber)?;
        Ok(state.head())
    }

    async fn subscribe_new_blocks(&self) -> RpcResult<BlockSubscription> {
        let mut state = self.lock();
        state.enter(MockMethod::Subscribe)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        state.subscribers.push(Subscriber {
            sender,
            cancel: cancel.clone(),
        });
        Ok(BlockSubscription::new(receiver, cancel))
    }

    async fn batch(&self, requests: Vec<RpcRequest>) -> RpcResult<Vec<RpcResult<RpcResponse>>> {
        self.lock().enter(MockMethod::Batch)?;
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.call(request).await);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u64) -> TxHash {
        TxHash::from_low_u64_be(n)
    }

    fn sender() -> Address {
        Address::repeat_byte(0x01)
    }

    #[tokio::test]
    async fn test_receipt_appears_at_reception_block() {
        let chain = MockChain::new()
            .with_transaction(MockTransaction::new(hash(1), sender(), 0).received_at(2));

        assert!(chain.get_transaction(hash(1)).await.unwrap().is_some());
        chain.advance();
        assert_eq!(chain.get_transaction_receipt(hash(1)).await.unwrap(), None);

        chain.advance();
        let receipt = chain.get_transaction_receipt(hash(1)).await.unwrap().unwrap();
        assert_eq!(receipt.block_number, 2);
        assert_eq!(receipt.block_hash, Some(mock_block_hash(0, 2)));
        assert_eq!(chain.get_transaction(hash(9)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fork_switches_receptions_and_parents() {
        let chain = MockChain::new()
            .with_transaction(MockTransaction::new(hash(1), sender(), 0).received_at(3))
            .fork_at(5, 1);
        chain.advance_to(4);
        let four = chain.head_block();
        assert!(chain.get_transaction_receipt(hash(1)).await.unwrap().is_some());

        chain.advance();
        let five = chain.head_block();
        assert_ne!(five.parent_hash, four.hash);
        assert_eq!(chain.get_transaction_receipt(hash(1)).await.unwrap(), None);

        // The orphaned block stays reachable by hash.
        let orphan = chain.get_block(BlockId::Hash(four.hash)).await.unwrap();
        assert_eq!(orphan, Some(four));
        let replaced = chain.get_block(BlockId::Number(4)).await.unwrap().unwrap();
        assert_eq!(replaced.hash, five.parent_hash);
    }

    #[tokio::test]
    async fn test_subscribers_receive_new_blocks() {
        let chain = MockChain::new();
        let mut subscription = chain.subscribe_new_blocks().await.unwrap();
        assert_eq!(chain.subscriber_count(), 1);

        let hash = chain.advance();
        assert_eq!(subscription.next().await, Some(Ok(hash)));

        subscription.stop();
        assert_eq!(chain.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let chain = MockChain::new()
            .with_transaction(MockTransaction::new(hash(1), sender(), 0));
        chain.fail(
            MockMethod::GetReceipt,
            RpcError::Transport("connection reset".to_string()),
        );

        let results = chain
            .batch(vec![RpcRequest::Transaction(hash(1)), RpcRequest::Receipt(hash(1))])
            .await
            .unwrap();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(RpcError::Transport(_))));
        assert_eq!(chain.calls(MockMethod::GetReceipt), 1);

        chain.fail(MockMethod::Batch, RpcError::Transport("down".to_string()));
        assert!(chain.batch(Vec::new()).await.is_err());
        chain.recover(MockMethod::Batch);
        assert!(chain.batch(Vec::new()).await.unwrap().is_empty());
    }
}
