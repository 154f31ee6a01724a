//! # dirsync Model
//!
//! Directory entry model and the entry store contract for dirsync.
//!
//! This crate provides:
//! - `Dn`/`Rdn` hierarchical entry names
//! - `Entry`/`Attribute` attribute-based entries
//! - `AttributeChange` for atomic modify calls
//! - `Filter`, `Scope` and `AliasDerefMode` for searches
//! - The `EntryStore` trait consumed by the replication engine
//! - `MemoryDirectory`, an in-memory `EntryStore` for tests and demos
//!
//! The replication engine never talks to a concrete backend directly;
//! everything goes through `EntryStore` so that whatever concurrency
//! control the real store provides is the sole arbiter of concurrent
//! mutation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dn;
mod entry;
mod error;
mod filter;
mod memory;
mod store;

pub mod sys;

pub use dn::{Dn, Rdn};
pub use entry::{Attribute, AttributeChange, Entry};
pub use error::{StoreError, StoreResult};
pub use filter::{AliasDerefMode, Filter, Scope};
pub use memory::MemoryDirectory;
pub use store::{EntryStore, SearchCursor};
