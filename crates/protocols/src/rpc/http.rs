//! JSON-RPC client for Ethereum-compatible nodes over HTTP.

use super::wire::{
    JsonRpcRequest, JsonRpcResponse, decode_filter_changes, decode_response, request_params,
};
use super::{BlockSubscription, ChainRpc, RpcRequest, RpcResponse};
use crate::error::{RpcError, RpcResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use txmirror_domain::{Block, BlockHash, BlockId, TransactionObject, TransactionReceipt, TxHash};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// HTTP JSON-RPC client.
///
/// Requests are not retried; every failure is handed to the caller.
#[derive(Clone, Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    request_id: Arc<AtomicU64>,
    poll_interval: Duration,
}

impl JsonRpcClient {
    /// Creates a client for the node at `url`.
    ///
    /// # Errors
    /// Returns `RpcError::Transport` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> RpcResult<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            request_id: Arc::new(AtomicU64::new(1)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Sets how often the block filter is polled.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Node URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, body: &T) -> RpcResult<String> {
        let response = self.http.post(&self.url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }

    async fn call_raw(&self, method: &'static str, params: Value) -> RpcResult<Value> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        debug!(method, id = request.id, "rpc call");

        let text = self.post(&request).await?;
        let response: JsonRpcResponse =
            serde_json::from_str(&text).map_err(|e| RpcError::decode(method, e))?;
        response.into_result()
    }

    async fn call_batch_raw(
        &self,
        requests: &[RpcRequest],
    ) -> RpcResult<Vec<RpcResult<RpcResponse>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let wire: Vec<JsonRpcRequest> = requests
            .iter()
            .map(|request| JsonRpcRequest::for_request(self.next_id(), request))
            .collect();
        debug!(size = wire.len(), "rpc batch");

        let text = self.post(&wire).await?;
        let responses: Vec<JsonRpcResponse> =
            serde_json::from_str(&text).map_err(|e| RpcError::decode("batch", e))?;

        // Nodes may answer a batch in any order.
        let mut by_id: HashMap<u64, JsonRpcResponse> = responses
            .into_iter()
            .filter_map(|response| response.id.map(|id| (id, response)))
            .collect();

        Ok(requests
            .iter()
            .zip(&wire)
            .map(|(request, sent)| {
                let response = by_id.remove(&sent.id).ok_or_else(|| {
                    RpcError::decode(sent.method, format!("no response for id {}", sent.id))
                })?;
                decode_response(request, response.into_result()?)
            })
            .collect())
    }

    async fn install_block_filter(&self) -> RpcResult<String> {
        let value = self.call_raw("eth_newBlockFilter", json!([])).await?;
        serde_json::from_value(value).map_err(|e| RpcError::decode("eth_newBlockFilter", e))
    }

    async fn poll_blocks(
        self,
        tx: mpsc::UnboundedSender<RpcResult<BlockHash>>,
        cancel: CancellationToken,
        mut filter: Option<String>,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if tx.is_closed() {
                break;
            }

            let id = match filter.take() {
                Some(id) => id,
                None => match self.install_block_filter().await {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(error = %e, "failed to install block filter");
                        if tx.send(Err(e)).is_err() {
                            break;
                        }
                        continue;
                    }
                },
            };

            let changes = self
                .call_raw("eth_getFilterChanges", json!([id]))
                .await
                .and_then(decode_filter_changes);
            match changes {
                Ok(hashes) => {
                    filter = Some(id);
                    if hashes.into_iter().any(|hash| tx.send(Ok(hash)).is_err()) {
                        break;
                    }
                }
                Err(e) => {
                    // The node may have expired the filter; reinstall next tick.
                    warn!(error = %e, filter = %id, "block filter poll failed");
                    if tx.send(Err(e)).is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(id) = filter
            && let Err(e) = self.call_raw("eth_uninstallFilter", json!([id])).await
        {
            debug!(error = %e, "failed to uninstall block filter");
        }
        info!(url = %self.url, "block polling stopped");
    }
}

#[async_trait]
impl ChainRpc for JsonRpcClient {
    async fn get_transaction(&self, hash: TxHash) -> RpcResult<Option<TransactionObject>> {
        self.call(RpcRequest::Transaction(hash)).await?.into_transaction()
    }

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> RpcResult<Option<TransactionReceipt>> {
        self.call(RpcRequest::Receipt(hash)).await?.into_receipt()
    }

    async fn get_block(&self, id: BlockId) -> RpcResult<Option<Block>> {
        self.call(RpcRequest::Block(id)).await?.into_block()
    }

    async fn get_block_number(&self) -> RpcResult<u64> {
        match self.call(RpcRequest::BlockNumber).await? {
            RpcResponse::BlockNumber(n) => Ok(n),
            other => Err(RpcError::decode(
                "eth_blockNumber",
                format!("unexpected response {other:?}"),
            )),
        }
    }

    async fn subscribe_new_blocks(&self) -> RpcResult<BlockSubscription> {
        let filter = self.install_block_filter().await?;
        info!(url = %self.url, filter = %filter, "block polling started");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(self.clone().poll_blocks(tx, cancel.clone(), Some(filter)));
        Ok(BlockSubscription::new(rx, cancel))
    }

    async fn call(&self, request: RpcRequest) -> RpcResult<RpcResponse> {
        let method = request.method();
        let value = self.call_raw(method, request_params(&request)).await?;
        decode_response(&request, value)
    }

    async fn batch(&self, requests: Vec<RpcRequest>) -> RpcResult<Vec<RpcResult<RpcResponse>>> {
        self.call_batch_raw(&requests).await
    }
}
