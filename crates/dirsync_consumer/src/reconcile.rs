//! Diff-based entry reconciliation.

use dirsync_model::{sys, AttributeChange, Entry};

/// Computes the attribute changes that make `local` match `remote`.
///
/// Attributes present on both sides are replaced wholesale with the
/// remote value (last-writer-wins at attribute granularity, not a
/// value-level merge); local-only attributes are removed; remote-only
/// attributes are added. Server-managed bookkeeping attributes are
/// excluded from the diff on both sides so replication does not fight
/// the local bookkeeping.
///
/// The result is applied as one modify call; an empty result means the
/// entries already agree.
pub fn diff_entries(local: &Entry, remote: &Entry) -> Vec<AttributeChange> {
    let mut changes = Vec::new();

    for local_attr in local.attributes() {
        if sys::is_bookkeeping(local_attr.id()) {
            continue;
        }

        match remote.get(local_attr.id()) {
            // replaced wholesale even when equal: comparing values first
            // costs about as much as letting the store overwrite them
            Some(remote_attr) => changes.push(AttributeChange::Replace(remote_attr.clone())),
            None => changes.push(AttributeChange::Remove(local_attr.clone())),
        }
    }

    for remote_attr in remote.attributes() {
        if sys::is_bookkeeping(remote_attr.id()) {
            continue;
        }

        if !local.has(remote_attr.id()) {
            changes.push(AttributeChange::Add(remote_attr.clone()));
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_model::{Attribute, Dn};

    fn entry(pairs: &[(&str, &[&str])]) -> Entry {
        let mut e = Entry::new(Dn::parse("uid=1,dc=example").unwrap());
        for (id, values) in pairs {
            e.put_values(*id, values.iter().copied());
        }
        e
    }

    #[test]
    fn replace_remove_add() {
        let local = entry(&[("cn", &["a"]), ("mail", &["x@y"])]);
        let remote = entry(&[("cn", &["a"]), ("phone", &["555"])]);

        let changes = diff_entries(&local, &remote);

        assert_eq!(changes.len(), 3);
        assert!(changes
            .iter()
            .any(|c| matches!(c, AttributeChange::Replace(a) if a.id() == "cn")));
        assert!(changes
            .iter()
            .any(|c| matches!(c, AttributeChange::Remove(a) if a.id() == "mail")));
        assert!(changes
            .iter()
            .any(|c| matches!(c, AttributeChange::Add(a) if a.id() == "phone")));
    }

    #[test]
    fn differing_shared_attribute_is_replaced() {
        let local = entry(&[("cn", &["old"])]);
        let remote = entry(&[("cn", &["new"])]);

        let changes = diff_entries(&local, &remote);
        assert_eq!(
            changes,
            vec![AttributeChange::Replace(Attribute::with_values("cn", ["new"]))]
        );
    }

    #[test]
    fn bookkeeping_attributes_are_ignored() {
        let local = entry(&[
            ("cn", &["a"]),
            ("entrycsn", &["1:r1:0:admin"]),
            ("modifiersname", &["cn=admin"]),
        ]);
        let remote = entry(&[
            ("cn", &["a"]),
            ("entryuuid", &["deadbeef"]),
            ("createtimestamp", &["20260830120000Z"]),
        ]);

        assert!(diff_entries(&local, &remote).is_empty());
    }

    #[test]
    fn identical_entries_yield_only_replaces() {
        let e = entry(&[("cn", &["a"]), ("mail", &["x@y"])]);
        let changes = diff_entries(&e, &e);
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .all(|c| matches!(c, AttributeChange::Replace(_))));
    }

    #[test]
    fn changes_apply_cleanly() {
        let mut local = entry(&[("cn", &["a"]), ("mail", &["x@y"])]);
        let remote = entry(&[("cn", &["b"]), ("phone", &["555"])]);

        let changes = diff_entries(&local, &remote);
        local.apply_changes(&changes);

        assert_eq!(local.get("cn").unwrap().first(), Some("b"));
        assert!(local.get("mail").is_none());
        assert_eq!(local.get("phone").unwrap().first(), Some("555"));
    }
}
