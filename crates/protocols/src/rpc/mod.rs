//! RPC boundary consumed by the tracker.

mod http;
mod subscription;
mod wire;

pub use http::JsonRpcClient;
pub use subscription::BlockSubscription;

use crate::error::{RpcError, RpcResult};
use async_trait::async_trait;
use futures::future::join_all;
use txmirror_domain::{Block, BlockId, TransactionObject, TransactionReceipt, TxHash};

/// A single request that can be placed in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcRequest {
    Transaction(TxHash),
    Receipt(TxHash),
    Block(BlockId),
    BlockNumber,
}

impl RpcRequest {
    /// Name of the node method serving this request.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::Transaction(_) => "eth_getTransactionByHash",
            RpcRequest::Receipt(_) => "eth_getTransactionReceipt",
            RpcRequest::Block(BlockId::Number(_)) => "eth_getBlockByNumber",
            RpcRequest::Block(BlockId::Hash(_)) => "eth_getBlockByHash",
            RpcRequest::BlockNumber => "eth_blockNumber",
        }
    }
}

/// Answer to an `RpcRequest`. `None` means the node does not know the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcResponse {
    Transaction(Option<TransactionObject>),
    Receipt(Option<TransactionReceipt>),
    Block(Option<Block>),
    BlockNumber(u64),
}

impl RpcResponse {
    /// Unwraps a transaction answer.
    ///
    /// # Errors
    /// Returns `RpcError::Decode` for any other variant.
    pub fn into_transaction(self) -> RpcResult<Option<TransactionObject>> {
        match self {
            RpcResponse::Transaction(tx) => Ok(tx),
            other => Err(mismatch("transaction", &other)),
        }
    }

    /// Unwraps a receipt answer.
    ///
    /// # Errors
    /// Returns `RpcError::Decode` for any other variant.
    pub fn into_receipt(self) -> RpcResult<Option<TransactionReceipt>> {
        match self {
            RpcResponse::Receipt(receipt) => Ok(receipt),
            other => Err(mismatch("receipt", &other)),
        }
    }

    /// Unwraps a block answer.
    ///
    /// # Errors
    /// Returns `RpcError::Decode` for any other variant.
    pub fn into_block(self) -> RpcResult<Option<Block>> {
        match self {
            RpcResponse::Block(block) => Ok(block),
            other => Err(mismatch("block", &other)),
        }
    }
}

fn mismatch(expected: &str, got: &RpcResponse) -> RpcError {
    RpcError::decode(expected, format!("unexpected response {got:?}"))
}

/// Eventually-consistent view of a chain.
///
/// Implementations may answer out of order, may return stale data and may
/// fail per request. Nothing here retries.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Looks up a transaction by hash.
    async fn get_transaction(&self, hash: TxHash) -> RpcResult<Option<TransactionObject>>;

    /// Looks up the receipt of a transaction. The returned receipt has no
    /// timestamp; callers resolve it from the block.
    async fn get_transaction_receipt(&self, hash: TxHash)
    -> RpcResult<Option<TransactionReceipt>>;

    /// Looks up a block by number or hash.
    async fn get_block(&self, id: BlockId) -> RpcResult<Option<Block>>;

    /// Returns the number of the latest block.
    async fn get_block_number(&self) -> RpcResult<u64>;

    /// Starts delivering hashes of new blocks.
    async fn subscribe_new_blocks(&self) -> RpcResult<BlockSubscription>;

    /// Executes one request.
    async fn call(&self, request: RpcRequest) -> RpcResult<RpcResponse> {
        match request {
            RpcRequest::Transaction(hash) => {
                self.get_transaction(hash).await.map(RpcResponse::Transaction)
            }
            RpcRequest::Receipt(hash) => self
                .get_transaction_receipt(hash)
                .await
                .map(RpcResponse::Receipt),
            RpcRequest::Block(id) => self.get_block(id).await.map(RpcResponse::Block),
            RpcRequest::BlockNumber => self.get_block_number().await.map(RpcResponse::BlockNumber),
        }
    }

    /// Executes several requests as one round trip where the transport
    /// allows it.
    ///
    /// The outer error means the whole batch failed; inner errors belong to
    /// single requests and never affect their siblings. Results are in
    /// request order.
    async fn batch(&self, requests: Vec<RpcRequest>) -> RpcResult<Vec<RpcResult<RpcResponse>>> {
        Ok(join_all(requests.into_iter().map(|request| self.call(request))).await)
    }
}
