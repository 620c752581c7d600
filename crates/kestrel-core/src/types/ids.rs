//! Identifier newtypes and the logical-to-physical worker mapping.

use serde::{Deserialize, Serialize};

/// Logical worker identifier as carried in request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u16);

/// Physical queue index: one task queue, slot pair and pinned core per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueId(pub u16);

impl QueueId {
    /// Index form for array access.
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Client identifier from the wire header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u16);

/// Per-client request identifier from the wire header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u32);

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps logical worker identifiers to physical queue indices.
///
/// Built once from configuration and read-only afterwards; consulted once
/// per request admission. Roster entries are the 1-based wire identifiers,
/// while the destination field on the wire is 0-based, so resolution adds
/// one before matching.
#[derive(Debug, Clone)]
pub struct WorkerMap {
    roster: Vec<u16>,
}

impl WorkerMap {
    /// Build the map from the configured roster.
    pub fn new(roster: Vec<u16>) -> Self {
        Self { roster }
    }

    /// Number of workers in the roster.
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    /// True when the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Wire identifier of the worker at a physical index.
    pub fn wire_id(&self, queue: QueueId) -> u16 {
        self.roster[queue.index()]
    }

    /// The configured roster, in physical-index order.
    pub fn roster(&self) -> &[u16] {
        &self.roster
    }

    /// Resolve a wire destination to a physical queue index.
    pub fn resolve(&self, dst: WorkerId) -> Option<QueueId> {
        let wire = dst.0.wrapping_add(1);
        self.roster
            .iter()
            .position(|&id| id == wire)
            .map(|i| QueueId(i as u16))
    }
}
