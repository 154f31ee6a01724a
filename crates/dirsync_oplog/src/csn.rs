//! Change sequence numbers.
//!
//! A `Csn` stamps every replicated change with a value any two replicas
//! order identically: wall-clock time first, then replica id, then a
//! per-replica counter, then the modifier. The counter disambiguates
//! same-millisecond bursts; the replica id breaks ties between clocks
//! that happen to agree.

use crate::error::{OplogError, OplogResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// A change sequence number: the logical clock value of one change.
///
/// Immutable once created. The derived equality and the manual `Ord`
/// agree: two CSNs are equal only when all four fields are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Csn {
    timestamp_millis: u64,
    replica_id: String,
    change_seq: u64,
    modifier_id: String,
}

impl Csn {
    /// Creates a CSN from raw parts. Prefer `CsnFactory::next`.
    pub fn new(
        timestamp_millis: u64,
        replica_id: impl Into<String>,
        change_seq: u64,
        modifier_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_millis,
            replica_id: replica_id.into(),
            change_seq,
            modifier_id: modifier_id.into(),
        }
    }

    /// Returns the wall-clock timestamp in milliseconds since the epoch.
    pub fn timestamp_millis(&self) -> u64 {
        self.timestamp_millis
    }

    /// Returns the id of the replica that issued this CSN.
    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Returns the per-replica change counter.
    pub fn change_seq(&self) -> u64 {
        self.change_seq
    }

    /// Returns the id of the actor that made the change.
    pub fn modifier_id(&self) -> &str {
        &self.modifier_id
    }
}

impl PartialOrd for Csn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Csn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp_millis
            .cmp(&other.timestamp_millis)
            .then_with(|| self.replica_id.cmp(&other.replica_id))
            .then_with(|| self.change_seq.cmp(&other.change_seq))
            .then_with(|| self.modifier_id.cmp(&other.modifier_id))
    }
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.timestamp_millis, self.replica_id, self.change_seq, self.modifier_id
        )
    }
}

impl FromStr for Csn {
    type Err = OplogError;

    fn from_str(s: &str) -> OplogResult<Self> {
        let mut parts = s.splitn(4, ':');

        let (Some(ts), Some(replica), Some(seq), Some(modifier)) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(OplogError::InvalidCsn(s.to_string()));
        };

        if replica.is_empty() {
            return Err(OplogError::InvalidCsn(s.to_string()));
        }

        let timestamp_millis = ts
            .parse()
            .map_err(|_| OplogError::InvalidCsn(s.to_string()))?;
        let change_seq = seq
            .parse()
            .map_err(|_| OplogError::InvalidCsn(s.to_string()))?;

        Ok(Csn::new(timestamp_millis, replica, change_seq, modifier))
    }
}

/// Issues strictly increasing CSNs for one replica on this process.
///
/// Same-millisecond calls bump the change counter; a wall clock that
/// steps backwards keeps issuing against the last seen timestamp so the
/// sequence never regresses.
#[derive(Debug)]
pub struct CsnFactory {
    replica_id: String,
    state: Mutex<FactoryState>,
}

#[derive(Debug, Default)]
struct FactoryState {
    last_timestamp: u64,
    change_seq: u64,
}

impl CsnFactory {
    /// Creates a factory for the given replica id.
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            state: Mutex::new(FactoryState::default()),
        }
    }

    /// Returns this factory's replica id.
    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Issues the next CSN, attributed to the given modifier.
    pub fn next(&self, modifier_id: &str) -> Csn {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut state = self.state.lock();

        if now > state.last_timestamp {
            state.last_timestamp = now;
            state.change_seq = 0;
        } else {
            state.change_seq += 1;
        }

        Csn::new(
            state.last_timestamp,
            self.replica_id.clone(),
            state.change_seq,
            modifier_id,
        )
    }
}
