//! Error types for the sync consumer.

use crate::config::ConfigError;
use dirsync_model::StoreError;
use dirsync_oplog::OplogError;
use thiserror::Error;

/// Result type for consumer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while a session is running.
///
/// Startup validation failures are deliberately a different type
/// (`ConfigError` in the config module): they are only ever seen before
/// any connection attempt, while everything here is a runtime condition
/// the supervisor knows how to survive.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The replication configuration failed startup validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether reconnecting may help.
        retryable: bool,
    },

    /// The provider rejected the bind credentials.
    #[error("bind failed: {0}")]
    BindFailed(String),

    /// The provider sent something the consumer cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local entry store rejected a mutation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The replication log rejected an append.
    #[error("oplog error: {0}")]
    Oplog(#[from] OplogError),

    /// Cookie persistence failed.
    #[error("cookie I/O error: {0}")]
    CookieIo(#[from] std::io::Error),

    /// The cookie does not fit the length-prefixed file format.
    #[error("cookie too large: {0} bytes")]
    CookieTooLarge(usize),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the supervisor should expect a retry to help.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::BindFailed(_) => true,
            SyncError::CookieIo(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::BindFailed("invalid credentials".into()).is_retryable());
        assert!(!SyncError::Protocol("junk".into()).is_retryable());
    }
}
