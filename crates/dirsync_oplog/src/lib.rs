//! # dirsync Oplog
//!
//! Causal ordering and the replicated operation log.
//!
//! This crate provides:
//! - `Csn`, a totally ordered change sequence number, and `CsnFactory`
//! - `CsnVector`, the per-replica high-water-mark map
//! - `Operation`, the closed set of replicated change variants
//! - `LogSink` / `NoopLogSink`, the explicit logging capability
//! - The `ReplicationLog` trait and `MemoryReplicationLog`
//!
//! ## Key Invariants
//!
//! - A factory never issues two equal CSNs
//! - Any two replicas order the same pair of CSNs identically
//! - A composite operation's children share its CSN and log nothing
//!   themselves; only the composite is appended
//! - Re-applying an already-applied operation is a no-op, not an error
//! - The purge vector never passes the update vector

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod csn;
mod error;
mod log;
mod operation;
mod vector;

pub use csn::{Csn, CsnFactory};
pub use error::{OplogError, OplogResult};
pub use log::{MemoryReplicationLog, ReplicationLog};
pub use operation::{LogSink, NoopLogSink, Operation, OperationKind};
pub use vector::CsnVector;
