//! Error types for the oplog.

use dirsync_model::StoreError;
use thiserror::Error;

/// Result type for oplog operations.
pub type OplogResult<T> = Result<T, OplogError>;

/// Errors that can occur while ordering, applying or logging operations.
#[derive(Debug, Error)]
pub enum OplogError {
    /// A CSN string could not be parsed.
    #[error("invalid csn: {0}")]
    InvalidCsn(String),

    /// A composite child carried a CSN different from its parent.
    #[error("csn mismatch: child {child} does not match composite {composite}")]
    CsnMismatch {
        /// The composite's CSN.
        composite: String,
        /// The offending child's CSN.
        child: String,
    },

    /// The entry store rejected a mutation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The log backend failed.
    #[error("log error: {0}")]
    Log(String),
}
