//! # dirsync Consumer
//!
//! Consumer-side synchronization engine for dirsync.
//!
//! This crate provides:
//! - `SyncConsumer`, the protocol state machine that keeps a local
//!   entry store converged with one remote provider
//! - Diff-based entry reconciliation and cascading subtree deletion
//! - Durable resumption cookies (file or config-entry backed)
//! - `ReplicationSupervisor`, one background thread per peer with
//!   backoff reconnect and an explicit stop signal
//! - `ProviderTransport`/`ReplyStream` abstractions and `MockProvider`
//!   for tests
//!
//! ## Key Invariants
//!
//! - Notifications from one session are applied strictly in arrival
//!   order; the session is single-threaded by construction
//! - The cookie is persisted only after the mutations it acknowledges
//!   are committed, so a restart replays at most one batch
//! - A replayed notification lands as a no-op, never an error
//! - A stale cookie (`refresh-required`) clears the cookie before the
//!   local wipe, so a crash mid-wipe just forces another full resync
//! - Transient transport failures degrade to "stale but running";
//!   only startup validation is fatal

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod consumer;
mod cookie;
mod delete;
mod error;
mod reconcile;
mod supervisor;
mod transport;

pub use config::{ConfigError, ConsumerConfig, CookieBackend, ReplicationConfig};
pub use consumer::{ConsumerState, SyncConsumer, SyncStats};
pub use cookie::CookieStore;
pub use delete::{delete_entries, delete_recursive, DELETE_BATCH_SIZE};
pub use error::{SyncError, SyncResult};
pub use reconcile::diff_entries;
pub use supervisor::ReplicationSupervisor;
pub use transport::{MockProvider, ProviderTransport, ReplyStream};
