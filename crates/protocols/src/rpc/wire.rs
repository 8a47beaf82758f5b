//! Ethereum JSON-RPC wire format.

use super::{RpcRequest, RpcResponse};
use crate::error::{RpcError, RpcResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use txmirror_domain::{
    Address, Block, BlockHash, BlockId, TransactionObject, TransactionReceipt, TxHash,
};

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Value,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }

    pub fn for_request(id: u64, request: &RpcRequest) -> Self {
        Self::new(id, request.method(), request_params(request))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    /// Result payload, `null` when the node returned no result.
    pub fn into_result(self) -> RpcResult<Value> {
        if let Some(error) = self.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    hash: TxHash,
    #[serde(deserialize_with = "deserialize_quantity")]
    nonce: u64,
    from: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceipt {
    transaction_hash: TxHash,
    #[serde(deserialize_with = "deserialize_quantity")]
    block_number: u64,
    #[serde(default)]
    block_hash: Option<BlockHash>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlock {
    #[serde(default, deserialize_with = "deserialize_opt_quantity")]
    number: Option<u64>,
    #[serde(default)]
    hash: Option<BlockHash>,
    parent_hash: BlockHash,
    #[serde(deserialize_with = "deserialize_quantity")]
    timestamp: u64,
}

/// Parses a `0x`-prefixed hex quantity.
pub(crate) fn parse_quantity(raw: &str) -> Result<u64, String> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| format!("quantity {raw:?} lacks 0x prefix"))?;
    if digits.is_empty() {
        return Err(format!("quantity {raw:?} has no digits"));
    }
    u64::from_str_radix(digits, 16).map_err(|e| format!("quantity {raw:?}: {e}"))
}

/// Formats a number as a hex quantity.
pub(crate) fn format_quantity(value: u64) -> String {
    format!("{value:#x}")
}

fn deserialize_quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_quantity(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_opt_quantity<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_quantity(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

pub(crate) fn request_params(request: &RpcRequest) -> Value {
    match request {
        RpcRequest::Transaction(hash) | RpcRequest::Receipt(hash) => json!([hash]),
        RpcRequest::Block(BlockId::Number(n)) => json!([format_quantity(*n), false]),
        RpcRequest::Block(BlockId::Hash(hash)) => json!([hash, false]),
        RpcRequest::BlockNumber => json!([]),
    }
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> RpcResult<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| RpcError::decode(method, e))
}

/// Converts a raw result into the response matching `request`.
pub(crate) fn decode_response(request: &RpcRequest, value: Value) -> RpcResult<RpcResponse> {
    let method = request.method();
    match request {
        RpcRequest::Transaction(_) => {
            let tx: Option<WireTransaction> = decode(method, value)?;
            Ok(RpcResponse::Transaction(tx.map(|tx| {
                TransactionObject::new(tx.hash, tx.nonce, tx.from)
            })))
        }
        RpcRequest::Receipt(_) => {
            let receipt: Option<WireReceipt> = decode(method, value)?;
            Ok(RpcResponse::Receipt(receipt.map(|r| {
                let receipt = TransactionReceipt::new(r.transaction_hash, r.block_number);
                match r.block_hash {
                    Some(hash) => receipt.with_block_hash(hash),
                    None => receipt,
                }
            })))
        }
        RpcRequest::Block(_) => {
            let Some(block) = decode::<WireBlock>(method, value)? else {
                return Ok(RpcResponse::Block(None));
            };
            // A block without number or hash is still pending.
            let (Some(number), Some(hash)) = (block.number, block.hash) else {
                return Ok(RpcResponse::Block(None));
            };
            Ok(RpcResponse::Block(Some(Block {
                number,
                hash,
                parent_hash: block.parent_hash,
                timestamp: block.timestamp,
            })))
        }
        RpcRequest::BlockNumber => {
            let raw: Option<String> = decode(method, value)?;
            let raw = raw.ok_or_else(|| RpcError::decode(method, "null block number"))?;
            parse_quantity(&raw)
                .map(RpcResponse::BlockNumber)
                .map_err(|e| RpcError::decode(method, e))
        }
    }
}

/// Decodes the hash list returned by `eth_getFilterChanges`.
pub(crate) fn decode_filter_changes(value: Value) -> RpcResult<Vec<BlockHash>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).map_err(|e| RpcError::decode("eth_getFilterChanges", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0"), Ok(0));
        assert_eq!(parse_quantity("0x1b4"), Ok(436));
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0x").is_err());
        assert_eq!(format_quantity(436), "0x1b4");
    }

    #[test]
    fn test_block_request_params() {
        assert_eq!(
            request_params(&RpcRequest::Block(BlockId::Number(16))),
            json!(["0x10", false])
        );
        assert_eq!(request_params(&RpcRequest::BlockNumber), json!([]));
    }

    #[test]
    fn test_decode_transaction() {
        let hash = TxHash::repeat_byte(0x11);
        let from = Address::repeat_byte(0x22);
        let value = json!({
            "hash": hash,
            "nonce": "0x2a",
            "from": from,
            "blockNumber": null,
            "value": "0x0",
        });

        let response = decode_response(&RpcRequest::Transaction(hash), value).unwrap();
        assert_eq!(
            response.into_transaction().unwrap(),
            Some(TransactionObject::new(hash, 42, from))
        );
    }

    #[test]
    fn test_null_result_means_unknown() {
        let hash = TxHash::repeat_byte(0x11);
        let response = decode_response(&RpcRequest::Receipt(hash), Value::Null).unwrap();
        assert_eq!(response, RpcResponse::Receipt(None));
    }

    #[test]
    fn test_decode_receipt_and_block() {
        let hash = TxHash::repeat_byte(0x11);
        let block_hash = BlockHash::repeat_byte(0x33);
        let receipt = json!({
            "transactionHash": hash,
            "blockNumber": "0x64",
            "blockHash": block_hash,
            "status": "0x1",
        });
        let response = decode_response(&RpcRequest::Receipt(hash), receipt).unwrap();
        let receipt = response.into_receipt().unwrap().unwrap();
        assert_eq!(receipt.block_number, 100);
        assert_eq!(receipt.block_hash, Some(block_hash));
        assert_eq!(receipt.timestamp, None);

        let block = json!({
            "number": "0x64",
            "hash": block_hash,
            "parentHash": BlockHash::repeat_byte(0x32),
            "timestamp": "0x5f5e100",
            "transactions": [],
        });
        let response = decode_response(&RpcRequest::Block(BlockId::Number(100)), block).unwrap();
        let block = response.into_block().unwrap().unwrap();
        assert_eq!(block.number, 100);
        assert_eq!(block.timestamp, 100_000_000);
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let hash = TxHash::repeat_byte(0x11);
        let err = decode_response(&RpcRequest::Transaction(hash), json!({"hash": 5})).unwrap_err();
        assert!(matches!(err, RpcError::Decode { .. }));
    }

    #[test]
    fn test_error_object_wins_over_result() {
        let response: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "error": {"code": -32000, "message": "header not found"},
        }))
        .unwrap();
        assert_eq!(response.id, Some(7));
        assert_eq!(
            response.into_result(),
            Err(RpcError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            })
        );
    }
}
