//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying sled failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Document (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Unique-key violation
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Credential sealing / unsealing failure
    #[error("credential error: {0}")]
    Crypto(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
