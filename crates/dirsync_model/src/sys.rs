//! Server-managed bookkeeping attribute ids.
//!
//! These attributes are maintained by the store itself, not by clients,
//! and replication must not fight the local bookkeeping: the consumer
//! excludes them when diffing a local entry against a remote snapshot.

/// Unique identity of an entry, stable across renames and moves.
pub const ENTRY_UUID: &str = "entryuuid";

/// The change sequence number of the entry's last modification.
pub const ENTRY_CSN: &str = "entrycsn";

/// Identity of the actor that created the entry.
pub const CREATORS_NAME: &str = "creatorsname";

/// Creation timestamp.
pub const CREATE_TIMESTAMP: &str = "createtimestamp";

/// Identity of the actor that last modified the entry.
pub const MODIFIERS_NAME: &str = "modifiersname";

/// Last modification timestamp.
pub const MODIFY_TIMESTAMP: &str = "modifytimestamp";

/// Internal id of the entry's parent.
pub const ENTRY_PARENT_ID: &str = "entryparentid";

/// Attribute ids excluded from diff-based reconciliation.
pub const MOD_IGNORE: &[&str] = &[
    ENTRY_UUID,
    ENTRY_CSN,
    MODIFIERS_NAME,
    MODIFY_TIMESTAMP,
    CREATE_TIMESTAMP,
    CREATORS_NAME,
    ENTRY_PARENT_ID,
];

/// Returns true if the given attribute id is server-managed bookkeeping.
pub fn is_bookkeeping(id: &str) -> bool {
    let id = id.to_ascii_lowercase();
    MOD_IGNORE.contains(&id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookkeeping_detection() {
        assert!(is_bookkeeping("entryUUID"));
        assert!(is_bookkeeping("modifytimestamp"));
        assert!(!is_bookkeeping("cn"));
    }
}
