//! Replicated operations.
//!
//! Every change that travels between replicas is one `Operation`: a
//! CSN, a target DN and a variant describing the mutation. Applying an
//! operation mutates the entry store and then appends the operation to
//! the supplied `LogSink`. The sink is an explicit capability, so a
//! composite can hand its children a no-op sink and log itself exactly
//! once.

use crate::csn::Csn;
use crate::error::{OplogError, OplogResult};
use dirsync_model::{Attribute, AttributeChange, Dn, Entry, EntryStore, Rdn, StoreError};
use serde::{Deserialize, Serialize};

/// Where applied operations get recorded.
pub trait LogSink: Send + Sync {
    /// Appends an applied operation.
    fn append(&self, operation: &Operation) -> OplogResult<()>;
}

/// A sink that records nothing.
///
/// Handed to the children of a composite so only the composite itself
/// reaches the real log.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn append(&self, _operation: &Operation) -> OplogResult<()> {
        Ok(())
    }
}

/// The closed set of replicated change variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Create the entry verbatim.
    AddEntry {
        /// The full entry to create.
        entry: Entry,
    },
    /// Delete the entry.
    DeleteEntry,
    /// Add attribute values.
    AddAttribute {
        /// Values to add.
        attribute: Attribute,
    },
    /// Remove attribute values (or the whole attribute).
    RemoveAttribute {
        /// Values to remove; empty means the whole attribute.
        attribute: Attribute,
    },
    /// Replace an attribute wholesale.
    ReplaceAttribute {
        /// The replacement.
        attribute: Attribute,
    },
    /// Rename the entry's leaf RDN.
    Rename {
        /// The new leaf RDN.
        new_rdn: Rdn,
        /// Whether the old RDN value is removed from the entry.
        delete_old_rdn: bool,
    },
    /// Move the entry under a new parent.
    Move {
        /// The new parent DN.
        new_parent: Dn,
    },
    /// An ordered group of operations applied as one unit.
    Composite {
        /// Child operations, all sharing the composite's CSN.
        children: Vec<Operation>,
    },
}

/// One replicated change: CSN, target and variant.
///
/// Created by the local write path or decoded from a peer, applied
/// exactly once, then immutable. Re-application (a replayed batch after
/// a cookie rollback) must land as a no-op, which is why every variant
/// tolerates finding its effect already present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    csn: Csn,
    dn: Dn,
    kind: OperationKind,
}

impl Operation {
    /// Creates an add-entry operation.
    pub fn add_entry(csn: Csn, entry: Entry) -> Self {
        let dn = entry.dn().clone();
        Self {
            csn,
            dn,
            kind: OperationKind::AddEntry { entry },
        }
    }

    /// Creates a delete-entry operation.
    pub fn delete_entry(csn: Csn, dn: Dn) -> Self {
        Self {
            csn,
            dn,
            kind: OperationKind::DeleteEntry,
        }
    }

    /// Creates an add-attribute operation.
    pub fn add_attribute(csn: Csn, dn: Dn, attribute: Attribute) -> Self {
        Self {
            csn,
            dn,
            kind: OperationKind::AddAttribute { attribute },
        }
    }

    /// Creates a remove-attribute operation.
    pub fn remove_attribute(csn: Csn, dn: Dn, attribute: Attribute) -> Self {
        Self {
            csn,
            dn,
            kind: OperationKind::RemoveAttribute { attribute },
        }
    }

    /// Creates a replace-attribute operation.
    pub fn replace_attribute(csn: Csn, dn: Dn, attribute: Attribute) -> Self {
        Self {
            csn,
            dn,
            kind: OperationKind::ReplaceAttribute { attribute },
        }
    }

    /// Creates a rename operation.
    pub fn rename(csn: Csn, dn: Dn, new_rdn: Rdn, delete_old_rdn: bool) -> Self {
        Self {
            csn,
            dn,
            kind: OperationKind::Rename {
                new_rdn,
                delete_old_rdn,
            },
        }
    }

    /// Creates a move operation.
    pub fn move_entry(csn: Csn, dn: Dn, new_parent: Dn) -> Self {
        Self {
            csn,
            dn,
            kind: OperationKind::Move { new_parent },
        }
    }

    /// Creates a composite from child operations.
    ///
    /// Every child must carry the composite's CSN; a mismatch is an
    /// error because replay relies on the group sharing one stamp.
    pub fn composite(csn: Csn, dn: Dn, children: Vec<Operation>) -> OplogResult<Self> {
        for child in &children {
            if child.csn != csn {
                return Err(OplogError::CsnMismatch {
                    composite: csn.to_string(),
                    child: child.csn.to_string(),
                });
            }
        }

        Ok(Self {
            csn,
            dn,
            kind: OperationKind::Composite { children },
        })
    }

    /// Returns the operation's CSN.
    pub fn csn(&self) -> &Csn {
        &self.csn
    }

    /// Returns the target DN.
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Returns the variant.
    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// Applies the operation against the store, then records it in the
    /// sink.
    ///
    /// Idempotency-tolerant: a target that is already in the requested
    /// state (or gone) is success, because a cookie rollback may replay
    /// up to one already-applied batch.
    pub fn apply(&self, store: &dyn EntryStore, log: &dyn LogSink) -> OplogResult<()> {
        match &self.kind {
            OperationKind::AddEntry { entry } => match store.add(entry.clone()) {
                Ok(()) | Err(StoreError::EntryExists(_)) => {}
                Err(e) => return Err(e.into()),
            },

            OperationKind::DeleteEntry => match store.delete(&self.dn) {
                Ok(()) | Err(StoreError::NoSuchEntry(_)) => {}
                Err(e) => return Err(e.into()),
            },

            OperationKind::AddAttribute { attribute } => {
                self.modify_if_present(store, AttributeChange::Add(attribute.clone()))?;
            }

            OperationKind::RemoveAttribute { attribute } => {
                self.modify_if_present(store, AttributeChange::Remove(attribute.clone()))?;
            }

            OperationKind::ReplaceAttribute { attribute } => {
                self.modify_if_present(store, AttributeChange::Replace(attribute.clone()))?;
            }

            OperationKind::Rename {
                new_rdn,
                delete_old_rdn,
            } => {
                if store.exists(&self.dn)? {
                    store.rename(&self.dn, new_rdn, *delete_old_rdn)?;
                }
                // source already gone: either replayed or superseded
            }

            OperationKind::Move { new_parent } => {
                if store.exists(&self.dn)? {
                    store.move_entry(&self.dn, new_parent)?;
                }
            }

            OperationKind::Composite { children } => {
                for child in children {
                    child.apply(store, &NoopLogSink)?;
                }
            }
        }

        log.append(self)
    }

    fn modify_if_present(
        &self,
        store: &dyn EntryStore,
        change: AttributeChange,
    ) -> OplogResult<()> {
        match store.modify(&self.dn, &[change]) {
            Ok(()) | Err(StoreError::NoSuchEntry(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
