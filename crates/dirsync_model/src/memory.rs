//! In-memory entry store.
//!
//! `MemoryDirectory` is the reference `EntryStore` used by the test
//! suites and demos. It keeps the whole tree in a single `BTreeMap`
//! behind a `RwLock`, which also gives it the serialization guarantees
//! the contract expects from a real backend.

use crate::dn::{Dn, Rdn};
use crate::entry::{Attribute, AttributeChange, Entry};
use crate::error::{StoreError, StoreResult};
use crate::filter::{AliasDerefMode, Filter, Scope};
use crate::store::{EntryStore, SearchCursor};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory tree of entries.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: RwLock<BTreeMap<Dn, Entry>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the directory holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns all DNs in the directory, in map order.
    pub fn dns(&self) -> Vec<Dn> {
        self.entries.read().keys().cloned().collect()
    }

    fn has_children(entries: &BTreeMap<Dn, Entry>, dn: &Dn) -> bool {
        entries.keys().any(|k| k.parent().as_ref() == Some(dn))
    }

    /// Re-keys `old_dn` and every descendant under `new_dn`.
    fn rekey_subtree(entries: &mut BTreeMap<Dn, Entry>, old_dn: &Dn, new_dn: &Dn) {
        let affected: Vec<Dn> = entries
            .keys()
            .filter(|k| k.is_under(old_dn))
            .cloned()
            .collect();

        for dn in affected {
            if let Some(mut entry) = entries.remove(&dn) {
                let target = dn.rebase(old_dn, new_dn);
                entry.set_dn(target.clone());
                entries.insert(target, entry);
            }
        }
    }

    /// Maintains the RDN attribute after a rename.
    fn fix_rdn_attribute(entry: &mut Entry, old_rdn: &Rdn, new_rdn: &Rdn, delete_old_rdn: bool) {
        let mut attr = entry
            .get(new_rdn.id())
            .cloned()
            .unwrap_or_else(|| Attribute::new(new_rdn.id()));
        attr.add_value(new_rdn.value());
        entry.put(attr);

        if delete_old_rdn {
            if let Some(mut old_attr) = entry.get(old_rdn.id()).cloned() {
                old_attr.remove_value(old_rdn.value());
                if old_attr.is_empty() {
                    entry.remove(old_rdn.id());
                } else {
                    entry.put(old_attr);
                }
            }
        }
    }
}

impl EntryStore for MemoryDirectory {
    fn exists(&self, dn: &Dn) -> StoreResult<bool> {
        Ok(self.entries.read().contains_key(dn))
    }

    fn lookup(&self, dn: &Dn) -> StoreResult<Entry> {
        self.entries
            .read()
            .get(dn)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchEntry(dn.to_string()))
    }

    fn add(&self, entry: Entry) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let dn = entry.dn().clone();

        if entries.contains_key(&dn) {
            return Err(StoreError::EntryExists(dn.to_string()));
        }

        // A parent is only required when the new entry sits under an
        // existing suffix; otherwise it starts a suffix of its own.
        if let Some(parent) = dn.parent() {
            let under_known_suffix = entries.keys().any(|k| parent.is_under(k));
            if under_known_suffix && !entries.contains_key(&parent) {
                return Err(StoreError::NoSuchParent(parent.to_string()));
            }
        }

        entries.insert(dn, entry);
        Ok(())
    }

    fn delete(&self, dn: &Dn) -> StoreResult<()> {
        let mut entries = self.entries.write();

        if !entries.contains_key(dn) {
            return Err(StoreError::NoSuchEntry(dn.to_string()));
        }

        if Self::has_children(&entries, dn) {
            return Err(StoreError::NotAllowedOnNonLeaf(dn.to_string()));
        }

        entries.remove(dn);
        Ok(())
    }

    fn modify(&self, dn: &Dn, changes: &[AttributeChange]) -> StoreResult<()> {
        let mut entries = self.entries.write();

        let entry = entries
            .get_mut(dn)
            .ok_or_else(|| StoreError::NoSuchEntry(dn.to_string()))?;

        // apply_changes never fails partway, so the call is all-or-nothing
        entry.apply_changes(changes);
        Ok(())
    }

    fn move_entry(&self, dn: &Dn, new_parent: &Dn) -> StoreResult<()> {
        let mut entries = self.entries.write();

        if !entries.contains_key(dn) {
            return Err(StoreError::NoSuchEntry(dn.to_string()));
        }
        if !entries.contains_key(new_parent) {
            return Err(StoreError::NoSuchParent(new_parent.to_string()));
        }

        let target = dn.under(new_parent);
        if target != *dn && entries.contains_key(&target) {
            return Err(StoreError::EntryExists(target.to_string()));
        }

        Self::rekey_subtree(&mut entries, dn, &target);
        Ok(())
    }

    fn rename(&self, dn: &Dn, new_rdn: &Rdn, delete_old_rdn: bool) -> StoreResult<()> {
        let mut entries = self.entries.write();

        if !entries.contains_key(dn) {
            return Err(StoreError::NoSuchEntry(dn.to_string()));
        }

        let target = dn.with_rdn(new_rdn.clone());
        if target != *dn && entries.contains_key(&target) {
            return Err(StoreError::EntryExists(target.to_string()));
        }

        let old_rdn = dn.rdn().clone();
        Self::rekey_subtree(&mut entries, dn, &target);

        if let Some(entry) = entries.get_mut(&target) {
            Self::fix_rdn_attribute(entry, &old_rdn, new_rdn, delete_old_rdn);
        }

        Ok(())
    }

    fn move_and_rename(
        &self,
        dn: &Dn,
        new_parent: &Dn,
        new_rdn: &Rdn,
        delete_old_rdn: bool,
    ) -> StoreResult<()> {
        let mut entries = self.entries.write();

        if !entries.contains_key(dn) {
            return Err(StoreError::NoSuchEntry(dn.to_string()));
        }
        if !entries.contains_key(new_parent) {
            return Err(StoreError::NoSuchParent(new_parent.to_string()));
        }

        let target = new_parent.child(new_rdn.clone());
        if target != *dn && entries.contains_key(&target) {
            return Err(StoreError::EntryExists(target.to_string()));
        }

        let old_rdn = dn.rdn().clone();
        Self::rekey_subtree(&mut entries, dn, &target);

        if let Some(entry) = entries.get_mut(&target) {
            Self::fix_rdn_attribute(entry, &old_rdn, new_rdn, delete_old_rdn);
        }

        Ok(())
    }

    fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        _deref: AliasDerefMode,
        attrs: &[String],
    ) -> StoreResult<SearchCursor> {
        let entries = self.entries.read();

        let results: Vec<Entry> = entries
            .values()
            .filter(|e| match scope {
                Scope::Object => e.dn() == base,
                Scope::OneLevel => e.dn().parent().as_ref() == Some(base),
                Scope::Subtree => e.dn().is_under(base),
            })
            .filter(|e| filter.matches(e))
            .map(|e| e.projected(attrs))
            .collect();

        Ok(SearchCursor::new(results))
    }
}
