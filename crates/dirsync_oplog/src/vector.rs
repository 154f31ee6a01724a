//! Per-replica high-water-mark vectors.

use crate::csn::Csn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A map from replica id to the highest CSN seen from that replica.
///
/// Two instances matter to the engine: the *update vector* records how
/// far each peer's changes have been applied locally, and the *purge
/// vector* records how far it is safe to discard log entries. The purge
/// vector must never pass the update vector; callers assert this with
/// `is_dominated_by`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsnVector {
    entries: BTreeMap<String, Csn>,
}

impl CsnVector {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a CSN, keeping the maximum per replica id.
    ///
    /// Returns true if the stored value advanced. Observing the same
    /// CSN twice is idempotent.
    pub fn observe(&mut self, csn: &Csn) -> bool {
        match self.entries.get(csn.replica_id()) {
            Some(current) if current >= csn => false,
            _ => {
                self.entries
                    .insert(csn.replica_id().to_string(), csn.clone());
                true
            }
        }
    }

    /// Returns true if the vector already accounts for the given CSN.
    ///
    /// A CSN from a replica the vector has never seen is uncovered.
    pub fn is_covered(&self, csn: &Csn) -> bool {
        self.entries
            .get(csn.replica_id())
            .map(|current| csn <= current)
            .unwrap_or(false)
    }

    /// Returns the recorded high-water mark for a replica, if any.
    pub fn get(&self, replica_id: &str) -> Option<&Csn> {
        self.entries.get(replica_id)
    }

    /// Folds another vector in, keeping the maximum per replica id.
    pub fn merge(&mut self, other: &CsnVector) {
        for csn in other.entries.values() {
            self.observe(csn);
        }
    }

    /// Returns true if every component of `self` is covered by `other`.
    ///
    /// Component-wise `self ⪯ other`; used to check purge ⪯ update.
    pub fn is_dominated_by(&self, other: &CsnVector) -> bool {
        self.entries.values().all(|csn| other.is_covered(csn))
    }

    /// Iterates over `(replica_id, csn)` pairs in replica-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Csn)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of replicas tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no replica has been observed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
