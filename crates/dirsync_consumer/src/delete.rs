//! Subtree and deletion-set removal.
//!
//! The store only deletes leaves, so both entry points here order their
//! work children-before-parents. An entry that is already gone counts as
//! deleted, which makes replayed delete notifications no-ops.

use crate::error::SyncResult;
use dirsync_model::{sys, AliasDerefMode, Dn, EntryStore, Filter, Scope, SearchCursor, StoreError};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// How many UUIDs a single deletion search may carry.
///
/// Delete sets from sync-info messages are partitioned into filters of
/// this size; present sets are never partitioned because their meaning
/// ("everything else is stale") only holds for the whole list at once.
pub const DELETE_BATCH_SIZE: usize = 10;

/// Deletes the entry at `dn` and its entire subtree.
///
/// Children are enumerated one level at a time, each level behind its
/// own cursor, so the walk never materializes the whole subtree at
/// once. Returns the number of entries removed; a missing base is not
/// an error.
pub fn delete_recursive(store: &dyn EntryStore, dn: &Dn) -> SyncResult<usize> {
    if !store.exists(dn)? {
        debug!(%dn, "subtree delete target already absent");
        return Ok(0);
    }

    let mut cursors = HashMap::new();
    delete_subtree(store, dn, &mut cursors)
}

fn delete_subtree(
    store: &dyn EntryStore,
    dn: &Dn,
    cursors: &mut HashMap<Dn, SearchCursor>,
) -> SyncResult<usize> {
    if !cursors.contains_key(dn) {
        let cursor = store.search(
            dn,
            Scope::OneLevel,
            &Filter::present(sys::ENTRY_UUID),
            AliasDerefMode::Never,
            &[sys::ENTRY_UUID.to_string()],
        )?;
        cursors.insert(dn.clone(), cursor);
    }

    let mut deleted = 0;

    while let Some(child) = cursors.get_mut(dn).and_then(SearchCursor::next_entry) {
        deleted += delete_subtree(store, child.dn(), cursors)?;
    }

    cursors.remove(dn);

    match store.delete(dn) {
        Ok(()) => {
            debug!(%dn, "deleted entry");
            deleted += 1;
        }
        // removed underneath us, same outcome
        Err(StoreError::NoSuchEntry(_)) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(deleted)
}

/// Applies a deletion set from a sync-info message.
///
/// With `is_present_set` false the UUIDs name entries to delete; they
/// are partitioned into [`DELETE_BATCH_SIZE`] filters so no single
/// search carries an unbounded disjunction. With `is_present_set` true
/// the UUIDs name entries to keep, and everything under `base` that is
/// not listed is deleted in one pass over the whole list.
///
/// Returns the number of entries removed.
pub fn delete_entries(
    store: &dyn EntryStore,
    base: &Dn,
    uuids: &[Uuid],
    is_present_set: bool,
) -> SyncResult<usize> {
    if is_present_set {
        let mut clauses = Vec::with_capacity(uuids.len() + 1);
        clauses.push(Filter::present(sys::ENTRY_UUID));
        for uuid in uuids {
            clauses.push(Filter::Not(Box::new(Filter::eq(
                sys::ENTRY_UUID,
                uuid.to_string(),
            ))));
        }

        return delete_matching(store, base, &Filter::And(clauses));
    }

    let mut deleted = 0;
    for batch in uuids.chunks(DELETE_BATCH_SIZE) {
        let filter = Filter::Or(
            batch
                .iter()
                .map(|uuid| Filter::eq(sys::ENTRY_UUID, uuid.to_string()))
                .collect(),
        );
        deleted += delete_matching(store, base, &filter)?;
    }

    Ok(deleted)
}

fn delete_matching(store: &dyn EntryStore, base: &Dn, filter: &Filter) -> SyncResult<usize> {
    let mut targets: Vec<Dn> = store
        .search(
            base,
            Scope::Subtree,
            filter,
            AliasDerefMode::Never,
            &[sys::ENTRY_UUID.to_string()],
        )?
        .map(|entry| entry.dn().clone())
        .collect();

    // deepest first, so matched parents are leaves by the time we reach
    // them; a matched ancestor still takes unmatched descendants with it
    targets.sort_by(|a, b| b.depth().cmp(&a.depth()));

    let mut deleted = 0;
    for dn in &targets {
        deleted += delete_recursive(store, dn)?;
    }

    debug!(%base, %filter, deleted, "applied deletion set");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_model::{Entry, MemoryDirectory};

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn seed(names: &[&str]) -> (MemoryDirectory, Vec<Uuid>) {
        let dir = MemoryDirectory::new();
        let mut uuids = Vec::new();

        for name in names {
            let uuid = Uuid::new_v4();
            let mut e = Entry::new(dn(name));
            e.put_values(sys::ENTRY_UUID, [uuid.to_string()]);
            dir.add(e).unwrap();
            uuids.push(uuid);
        }

        (dir, uuids)
    }

    #[test]
    fn deletes_whole_subtree() {
        let (dir, _) = seed(&[
            "dc=example",
            "ou=people,dc=example",
            "uid=1,ou=people,dc=example",
            "uid=2,ou=people,dc=example",
            "cn=cert,uid=2,ou=people,dc=example",
            "ou=groups,dc=example",
        ]);

        let deleted = delete_recursive(&dir, &dn("ou=people,dc=example")).unwrap();

        assert_eq!(deleted, 4);
        assert!(!dir.exists(&dn("ou=people,dc=example")).unwrap());
        assert!(!dir.exists(&dn("cn=cert,uid=2,ou=people,dc=example")).unwrap());
        assert!(dir.exists(&dn("ou=groups,dc=example")).unwrap());
    }

    #[test]
    fn missing_base_is_a_no_op() {
        let (dir, _) = seed(&["dc=example"]);
        let deleted = delete_recursive(&dir, &dn("ou=nowhere,dc=example")).unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn delete_set_removes_listed_entries() {
        let (dir, uuids) = seed(&[
            "dc=example",
            "uid=1,dc=example",
            "uid=2,dc=example",
            "uid=3,dc=example",
        ]);

        let deleted = delete_entries(&dir, &dn("dc=example"), &uuids[1..3], false).unwrap();

        assert_eq!(deleted, 2);
        assert!(!dir.exists(&dn("uid=1,dc=example")).unwrap());
        assert!(!dir.exists(&dn("uid=2,dc=example")).unwrap());
        assert!(dir.exists(&dn("uid=3,dc=example")).unwrap());
    }

    #[test]
    fn delete_set_is_batched() {
        let names: Vec<String> = (0..25).map(|i| format!("uid={i},dc=example")).collect();
        let mut all: Vec<&str> = vec!["dc=example"];
        all.extend(names.iter().map(String::as_str));

        let (dir, uuids) = seed(&all);

        // 25 targets span three batches of at most DELETE_BATCH_SIZE
        let deleted = delete_entries(&dir, &dn("dc=example"), &uuids[1..], false).unwrap();

        assert_eq!(deleted, 25);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn present_set_keeps_only_listed_entries() {
        let (dir, uuids) = seed(&[
            "dc=example",
            "uid=1,dc=example",
            "uid=2,dc=example",
            "uid=3,dc=example",
        ]);

        // present: suffix, uid=1 and uid=3
        let present = vec![uuids[0], uuids[1], uuids[3]];
        let deleted = delete_entries(&dir, &dn("dc=example"), &present, true).unwrap();

        assert_eq!(deleted, 1);
        assert!(dir.exists(&dn("uid=1,dc=example")).unwrap());
        assert!(!dir.exists(&dn("uid=2,dc=example")).unwrap());
        assert!(dir.exists(&dn("uid=3,dc=example")).unwrap());
    }

    #[test]
    fn deleted_parent_takes_unlisted_children() {
        let (dir, uuids) = seed(&[
            "dc=example",
            "ou=people,dc=example",
            "uid=1,ou=people,dc=example",
        ]);

        let deleted = delete_entries(&dir, &dn("dc=example"), &uuids[1..2], false).unwrap();

        assert_eq!(deleted, 2);
        assert!(!dir.exists(&dn("uid=1,ou=people,dc=example")).unwrap());
        assert!(dir.exists(&dn("dc=example")).unwrap());
    }
}
