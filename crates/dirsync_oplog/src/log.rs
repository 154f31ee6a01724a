//! The replicated operation log.

use crate::csn::Csn;
use crate::error::OplogResult;
use crate::operation::{LogSink, Operation};
use crate::vector::CsnVector;
use dirsync_model::Dn;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Storage for applied operations, keyed by CSN.
///
/// Besides the ordered log itself, the store tracks the UUID↔DN mapping
/// (identities survive renames; DNs do not) and the two progress
/// vectors: how far each peer has been applied locally (update) and how
/// far history may be discarded (purge).
pub trait ReplicationLog: LogSink {
    /// Returns operations with a CSN strictly greater than `from`.
    fn logs_after(&self, from: &Csn) -> Vec<Operation>;

    /// Returns operations not yet covered by the given vector.
    fn logs_uncovered_by(&self, vector: &CsnVector) -> Vec<Operation>;

    /// Drops operations with a CSN strictly less than `before`.
    ///
    /// Returns the number of operations removed. The purge vector
    /// advances accordingly and never passes the update vector.
    fn purge_before(&self, before: &Csn) -> usize;

    /// Records the DN currently holding the given entry identity.
    fn put_uuid(&self, uuid: Uuid, dn: Dn);

    /// Returns the DN for an entry identity, if known.
    fn dn_for_uuid(&self, uuid: &Uuid) -> Option<Dn>;

    /// Forgets an entry identity. Returns true if it was known.
    fn remove_uuid(&self, uuid: &Uuid) -> bool;

    /// Returns a snapshot of the update vector.
    fn update_vector(&self) -> CsnVector;

    /// Returns a snapshot of the purge vector.
    fn purge_vector(&self) -> CsnVector;

    /// Returns the number of stored operations.
    fn log_size(&self) -> usize;
}

/// An in-process `ReplicationLog`.
///
/// The real deployment backs this with durable storage; the in-memory
/// form carries the compaction policy and is what the test suites run
/// against.
#[derive(Debug, Default)]
pub struct MemoryReplicationLog {
    operations: RwLock<BTreeMap<Csn, Operation>>,
    uuid_map: RwLock<HashMap<Uuid, Dn>>,
    update_vector: RwLock<CsnVector>,
    purge_vector: RwLock<CsnVector>,
}

impl MemoryReplicationLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogSink for MemoryReplicationLog {
    fn append(&self, operation: &Operation) -> OplogResult<()> {
        self.update_vector.write().observe(operation.csn());
        self.operations
            .write()
            .insert(operation.csn().clone(), operation.clone());
        Ok(())
    }
}

impl ReplicationLog for MemoryReplicationLog {
    fn logs_after(&self, from: &Csn) -> Vec<Operation> {
        use std::ops::Bound;

        self.operations
            .read()
            .range((Bound::Excluded(from.clone()), Bound::Unbounded))
            .map(|(_, op)| op.clone())
            .collect()
    }

    fn logs_uncovered_by(&self, vector: &CsnVector) -> Vec<Operation> {
        self.operations
            .read()
            .values()
            .filter(|op| !vector.is_covered(op.csn()))
            .cloned()
            .collect()
    }

    fn purge_before(&self, before: &Csn) -> usize {
        let mut operations = self.operations.write();
        let keep = operations.split_off(before);
        let removed = std::mem::replace(&mut *operations, keep);

        if !removed.is_empty() {
            let update = self.update_vector.read().clone();
            let mut purge = self.purge_vector.write();

            for csn in removed.keys() {
                // only advance within what has actually been applied
                if update.is_covered(csn) {
                    purge.observe(csn);
                }
            }
            debug_assert!(purge.is_dominated_by(&update));
        }

        removed.len()
    }

    fn put_uuid(&self, uuid: Uuid, dn: Dn) {
        self.uuid_map.write().insert(uuid, dn);
    }

    fn dn_for_uuid(&self, uuid: &Uuid) -> Option<Dn> {
        self.uuid_map.read().get(uuid).cloned()
    }

    fn remove_uuid(&self, uuid: &Uuid) -> bool {
        self.uuid_map.write().remove(uuid).is_some()
    }

    fn update_vector(&self) -> CsnVector {
        self.update_vector.read().clone()
    }

    fn purge_vector(&self) -> CsnVector {
        self.purge_vector.read().clone()
    }

    fn log_size(&self) -> usize {
        self.operations.read().len()
    }
}
