use thiserror::Error;

/// Errors returned by a chain RPC client.
///
/// Payloads are strings so a single batch failure can be handed to every
/// request it covered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Network or connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response did not have the expected shape.
    #[error("failed to decode {method} response: {reason}")]
    Decode { method: String, reason: String },

    /// The block subscription ended.
    #[error("block subscription closed")]
    SubscriptionClosed,
}

impl RpcError {
    pub(crate) fn decode(method: &str, reason: impl ToString) -> Self {
        RpcError::Decode {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        RpcError::Transport(err.to_string())
    }
}

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
