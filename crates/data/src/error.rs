use thiserror::Error;

/// Errors raised by a snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key cannot be mapped onto the backend, e.g. a path separator in a
    /// file store key.
    #[error("invalid store key {0:?}")]
    InvalidKey(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
