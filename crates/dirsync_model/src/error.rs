//! Error types for the entry store contract.

use thiserror::Error;

/// Result type for entry store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by an entry store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The name could not be parsed.
    #[error("invalid distinguished name: {0}")]
    InvalidDn(String),

    /// No entry exists at the given name.
    #[error("no such entry: {0}")]
    NoSuchEntry(String),

    /// An entry already exists at the given name.
    #[error("entry already exists: {0}")]
    EntryExists(String),

    /// Deletion was requested for an entry that still has children.
    #[error("not allowed on non-leaf entry: {0}")]
    NotAllowedOnNonLeaf(String),

    /// A structural operation referenced a parent that does not exist.
    #[error("no such parent: {0}")]
    NoSuchParent(String),

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}
