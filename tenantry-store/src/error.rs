use std::time::Duration;

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure errors for the document store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Fatal for the request: the retry budget is spent.
    #[error("Could not connect to {endpoint} after {attempts} attempt(s) in {elapsed:?}: {last_error}")]
    ConnectExhausted {
        endpoint: String,
        attempts: u32,
        elapsed: Duration,
        last_error: String,
    },

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Malformed document in '{collection}': {message}")]
    MalformedDocument { collection: String, message: String },
}

impl StoreError {
    /// Exhausted connects must fail the request instead of defaulting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectExhausted { .. })
    }
}
