//! Operation records and the mergeable history built from them.
//!
//! Each simulated client appends to its own [`History`] while it runs. At the
//! end of a run the per-client histories are merged into one, which is what
//! the external linearizability checker consumes.
//!
//! # Ordering
//!
//! Records are exported ordered by invocation time, then completion time,
//! then client and request identifier. If one record returned before another
//! was invoked, it is therefore always exported first; records whose
//! intervals overlap end up in a deterministic order that does not depend on
//! which worker happened to merge first.

use crate::{ClientId, HistoryError, OperationKind, Request, RequestId, Response, Revision};
use crate::{StoreError, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// One invocation of a store call and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub client: ClientId,
    pub id: RequestId,
    pub request: Request,
    pub invoked: Timestamp,
    pub returned: Timestamp,
    pub outcome: Result<Response, StoreError>,
}

impl OperationRecord {
    /// Kind of the recorded call.
    pub fn kind(&self) -> OperationKind {
        self.request.kind()
    }

    /// Whether the store call succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Store revision reported by a successful call.
    pub fn revision(&self) -> Option<Revision> {
        self.outcome.as_ref().ok().and_then(Response::revision)
    }

    /// Returns true if this record returned no later than `other` was invoked.
    pub fn happens_before(&self, other: &OperationRecord) -> bool {
        self.returned <= other.invoked
    }

    fn real_time_order(a: &OperationRecord, b: &OperationRecord) -> Ordering {
        a.invoked
            .cmp(&b.invoked)
            .then(a.returned.cmp(&b.returned))
            .then(a.client.cmp(&b.client))
            .then(a.id.cmp(&b.id))
    }
}

/// Append-only collection of operation records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    records: Vec<OperationRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    ///
    /// A client issues operations serially, so appending in call order keeps
    /// a per-client history sorted by invocation time.
    pub fn append(&mut self, record: OperationRecord) {
        self.records.push(record);
    }

    /// Union of two histories.
    ///
    /// Records are identified by request id, so merging a history with itself
    /// or merging overlapping histories never duplicates a record.
    pub fn merge(&self, other: &History) -> History {
        let mut seen = HashSet::with_capacity(self.records.len() + other.records.len());
        let mut records: Vec<OperationRecord> = self
            .records
            .iter()
            .chain(other.records.iter())
            .filter(|record| seen.insert(record.id))
            .cloned()
            .collect();
        records.sort_by(OperationRecord::real_time_order);
        History { records }
    }

    /// Records in export order.
    pub fn operations(&self) -> &[OperationRecord] {
        &self.records
    }

    /// Consume the history, returning its records.
    pub fn into_operations(self) -> Vec<OperationRecord> {
        self.records
    }

    /// Last record in export order.
    pub fn last(&self) -> Option<&OperationRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check the structural invariants a checker relies on.
    ///
    /// Every record must be invoked no later than it returned, request ids
    /// must be unique and no client may have two operations in flight at once.
    pub fn validate(&self) -> Result<(), HistoryError> {
        let mut ids = HashSet::with_capacity(self.records.len());
        let mut by_client: HashMap<ClientId, Vec<&OperationRecord>> = HashMap::new();

        for record in &self.records {
            if record.invoked > record.returned {
                return Err(HistoryError::InvertedInterval(record.id));
            }
            if !ids.insert(record.id) {
                return Err(HistoryError::DuplicateRequest(record.id));
            }
            by_client.entry(record.client).or_default().push(record);
        }

        for (client, mut records) in by_client {
            records.sort_by(|a, b| OperationRecord::real_time_order(a, b));
            for pair in records.windows(2) {
                if !pair[0].happens_before(pair[1]) {
                    return Err(HistoryError::OverlappingClientOperations {
                        client,
                        first: pair[0].id,
                        second: pair[1].id,
                    });
                }
            }
        }

        Ok(())
    }
}
