//! The entry store contract.

use crate::dn::{Dn, Rdn};
use crate::entry::{AttributeChange, Entry};
use crate::error::StoreResult;
use crate::filter::{AliasDerefMode, Filter, Scope};

/// A cursor over search results.
///
/// Results are materialized at search time; the cursor exists so that
/// callers (the cascading delete in particular) can interleave reads
/// with mutations without holding a borrow on the store.
#[derive(Debug)]
pub struct SearchCursor {
    entries: std::vec::IntoIter<Entry>,
}

impl SearchCursor {
    /// Wraps a result set in a cursor.
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }

    /// Returns the next entry, or `None` when exhausted.
    pub fn next_entry(&mut self) -> Option<Entry> {
        self.entries.next()
    }
}

impl Iterator for SearchCursor {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.next_entry()
    }
}

/// The tree-structured entry store the replication engine runs against.
///
/// Every mutation the consumer makes goes through these entry points, the
/// same ones local clients use, so the store's own concurrency control
/// serializes replicated and local writes.
pub trait EntryStore: Send + Sync {
    /// Returns true if an entry exists at the DN.
    fn exists(&self, dn: &Dn) -> StoreResult<bool>;

    /// Returns the entry at the DN.
    fn lookup(&self, dn: &Dn) -> StoreResult<Entry>;

    /// Adds a new entry. Fails if one already exists at its DN.
    fn add(&self, entry: Entry) -> StoreResult<()>;

    /// Deletes the entry at the DN. Fails on non-leaf entries.
    fn delete(&self, dn: &Dn) -> StoreResult<()>;

    /// Applies the change list to the entry as one atomic call.
    fn modify(&self, dn: &Dn, changes: &[AttributeChange]) -> StoreResult<()>;

    /// Moves the entry (and its subtree) under a new parent.
    fn move_entry(&self, dn: &Dn, new_parent: &Dn) -> StoreResult<()>;

    /// Renames the entry's leaf RDN in place.
    fn rename(&self, dn: &Dn, new_rdn: &Rdn, delete_old_rdn: bool) -> StoreResult<()>;

    /// Moves and renames in one step.
    fn move_and_rename(
        &self,
        dn: &Dn,
        new_parent: &Dn,
        new_rdn: &Rdn,
        delete_old_rdn: bool,
    ) -> StoreResult<()>;

    /// Searches under `base` with the given scope and filter.
    ///
    /// `attrs` restricts returned attributes; empty means all.
    fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        deref: AliasDerefMode,
        attrs: &[String],
    ) -> StoreResult<SearchCursor>;
}
