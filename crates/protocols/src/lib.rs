//! Chain access for the transaction tracker.
//!
//! This crate defines the RPC boundary the tracker consumes:
//! - The `ChainRpc` trait with batching and block subscriptions
//! - A JSON-RPC client for Ethereum-compatible nodes
//! - A scripted in-memory chain for tests, behind the `mock` feature

/// RPC error types.
pub mod error;
/// Scripted in-memory chain.
#[cfg(any(test, feature = "mock"))]
pub mod mock;
/// RPC trait, request types and the JSON-RPC client.
pub mod rpc;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{RpcError, RpcResult};
    #[cfg(any(test, feature = "mock"))]
    pub use crate::mock::{MockChain, MockMethod, MockTransaction};
    pub use crate::rpc::{BlockSubscription, ChainRpc, JsonRpcClient, RpcRequest, RpcResponse};
}

pub use error::{RpcError, RpcResult};
pub use rpc::{BlockSubscription, ChainRpc, RpcRequest, RpcResponse};
