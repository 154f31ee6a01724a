//! Sync request and reply messages.

use dirsync_model::{AliasDerefMode, Dn, Entry, Filter, Rdn, Scope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the provider serves the synchronization session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// One bounded round-trip of changes, then the session ends.
    RefreshOnly,
    /// The request stays open and changes stream indefinitely.
    RefreshAndPersist,
}

/// A search-style request augmented with the synchronization control.
///
/// The cookie is the sole resumption contract: absent or empty means
/// "send everything", anything else is an opaque token the provider
/// issued earlier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Base DN of the replicated area.
    pub base: Dn,
    /// Search scope under the base.
    pub scope: Scope,
    /// Content filter.
    pub filter: Filter,
    /// Attributes to return; empty means all.
    pub attributes: Vec<String>,
    /// Alias dereferencing policy.
    pub deref: AliasDerefMode,
    /// Maximum number of entries per refresh; 0 means unlimited.
    pub size_limit: u32,
    /// Search time limit in seconds; 0 means unlimited.
    pub time_limit_secs: u32,
    /// Synchronization mode.
    pub mode: SyncMode,
    /// Resumption cookie; `None` forces a full transfer.
    pub cookie: Option<Vec<u8>>,
    /// Hint that the consumer wants a full reload regardless of cookie.
    pub reload_hint: bool,
}

/// The structural half of a ModDN notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModDn {
    /// The entry moved under a new parent.
    Move {
        /// The new parent DN.
        new_parent: Dn,
    },
    /// The entry's leaf RDN changed.
    Rename {
        /// The new leaf RDN.
        new_rdn: Rdn,
        /// Whether the old RDN value leaves the entry.
        delete_old_rdn: bool,
    },
    /// Move and rename in one step.
    MoveAndRename {
        /// The new parent DN.
        new_parent: Dn,
        /// The new leaf RDN.
        new_rdn: Rdn,
        /// Whether the old RDN value leaves the entry.
        delete_old_rdn: bool,
    },
}

/// What kind of change a notification reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    /// The entry is new (or new to this consumer).
    Add,
    /// The entry's attributes changed; the notification carries the
    /// full remote snapshot to reconcile against.
    Modify,
    /// The entry was moved and/or renamed.
    ModDn(ModDn),
    /// The entry (and, implicitly, its whole subtree) was removed.
    Delete,
    /// Full-refresh bookkeeping: the entry still exists, no mutation.
    Present,
}

/// One per-entry change notification from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// The kind of change.
    pub change: ChangeType,
    /// The remote entry snapshot the change refers to.
    pub entry: Entry,
    /// The entry's stable identity.
    pub entry_uuid: Uuid,
    /// Fresh resumption cookie, when the provider advances it.
    pub cookie: Option<Vec<u8>>,
}

/// Out-of-band message carrying the UUID presence/absence set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInfoMessage {
    /// Fresh resumption cookie, if any.
    pub cookie: Option<Vec<u8>>,
    /// True: `entry_uuids` lists entries deleted upstream, delete
    /// exactly those. False: it lists everything still present, delete
    /// the rest.
    pub refresh_deletes: bool,
    /// The identity set.
    pub entry_uuids: Vec<Uuid>,
    /// True when the refresh phase is complete.
    pub refresh_done: bool,
}

/// Result code carried by the done marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    /// The sync completed (or the persist phase ended) normally.
    Success,
    /// The requested base does not exist on the provider.
    NoSuchObject,
    /// The cookie is too stale to resume; a full reload is required.
    RefreshRequired,
    /// Any other provider result code.
    Other(u32),
}

/// The done marker terminating a reply stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDoneMessage {
    /// The session result.
    pub result: ResultCode,
    /// Final resumption cookie, if the provider issued one.
    pub cookie: Option<Vec<u8>>,
}

/// One item of the reply stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncReply {
    /// A per-entry change notification.
    Entry(ChangeNotification),
    /// An out-of-band sync-info message.
    Info(SyncInfoMessage),
    /// The terminating done marker.
    Done(SyncDoneMessage),
}

impl ChangeNotification {
    /// Creates a notification without a cookie.
    pub fn new(change: ChangeType, entry: Entry, entry_uuid: Uuid) -> Self {
        Self {
            change,
            entry,
            entry_uuid,
            cookie: None,
        }
    }

    /// Attaches a fresh cookie.
    pub fn with_cookie(mut self, cookie: impl Into<Vec<u8>>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }
}

impl SyncDoneMessage {
    /// A successful done marker.
    pub fn success(cookie: Option<Vec<u8>>) -> Self {
        Self {
            result: ResultCode::Success,
            cookie,
        }
    }

    /// A done marker reporting the given failure.
    pub fn failure(result: ResultCode) -> Self {
        Self {
            result,
            cookie: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_cookie_builder() {
        let entry = Entry::new(Dn::parse("uid=1,dc=example").unwrap());
        let n = ChangeNotification::new(ChangeType::Add, entry, Uuid::new_v4())
            .with_cookie(b"rid=1,csn=42".to_vec());

        assert_eq!(n.cookie.as_deref(), Some(&b"rid=1,csn=42"[..]));
        assert_eq!(n.change, ChangeType::Add);
    }

    #[test]
    fn done_markers() {
        let done = SyncDoneMessage::success(Some(vec![1, 2, 3]));
        assert_eq!(done.result, ResultCode::Success);

        let stale = SyncDoneMessage::failure(ResultCode::RefreshRequired);
        assert_eq!(stale.result, ResultCode::RefreshRequired);
        assert!(stale.cookie.is_none());
    }
}
