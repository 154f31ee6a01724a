//! # dirsync Protocol
//!
//! Content-synchronization protocol types for dirsync.
//!
//! This crate defines the request a consumer sends to a provider and
//! the stream of replies it gets back: per-entry change notifications,
//! out-of-band sync-info messages and the final done marker. It is a
//! pure type crate with no I/O; the transport that moves these values
//! is supplied by the embedding server.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;

pub use messages::{
    ChangeNotification, ChangeType, ModDn, ResultCode, SyncDoneMessage, SyncInfoMessage, SyncMode,
    SyncReply, SyncRequest,
};
