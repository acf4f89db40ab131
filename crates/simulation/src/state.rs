//! Revisioned key-value state behind [`SimStore`](crate::SimStore).
//!
//! Every mutation bumps the store revision exactly once, including a
//! transaction applying several writes. Reads and failed conditions never
//! change the revision.

use robustness_types::{
    Comparison, DeleteResponse, GetResponse, KeyValue, LeaseGrantResponse, LeaseId,
    LeaseRevokeResponse, LeaseTimeToLiveResponse, PutResponse, RangeResponse, Revision,
    StoreError, TxnOp, TxnOpResult, TxnResponse,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

/// First lease identifier handed out. Non-zero so a zero id never looks valid.
const FIRST_LEASE_ID: i64 = 0x1000;

#[derive(Debug)]
struct Lease {
    ttl_secs: i64,
    granted_at: Instant,
    keys: BTreeSet<String>,
}

#[derive(Debug)]
pub(crate) struct StoreState {
    revision: Revision,
    kvs: BTreeMap<String, KeyValue>,
    leases: HashMap<LeaseId, Lease>,
    next_lease: i64,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            revision: Revision(1),
            kvs: BTreeMap::new(),
            leases: HashMap::new(),
            next_lease: FIRST_LEASE_ID,
        }
    }
}

impl StoreState {
    pub(crate) fn revision(&self) -> Revision {
        self.revision
    }

    pub(crate) fn lease_count(&self) -> usize {
        self.leases.len()
    }

    pub(crate) fn get(&self, key: &str) -> GetResponse {
        GetResponse {
            kv: self.kvs.get(key).cloned(),
            revision: self.revision,
        }
    }

    pub(crate) fn range(&self, prefix: &str) -> RangeResponse {
        let kvs = self
            .kvs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, kv)| kv.clone())
            .collect();
        RangeResponse {
            kvs,
            revision: self.revision,
        }
    }

    pub(crate) fn put(
        &mut self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<PutResponse, StoreError> {
        self.check_lease(lease)?;
        let revision = self.revision.next();
        self.write(key, value, lease, revision);
        self.revision = revision;
        Ok(PutResponse { revision })
    }

    pub(crate) fn delete(&mut self, key: &str) -> DeleteResponse {
        let revision = self.revision.next();
        let deleted = self.remove(key);
        if deleted > 0 {
            self.revision = revision;
        }
        DeleteResponse {
            deleted,
            revision: self.revision,
        }
    }

    pub(crate) fn txn(&mut self, conditions: &[Comparison], ops: &[TxnOp]) -> TxnResponse {
        let holds = conditions.iter().all(|condition| {
            let current = self
                .kvs
                .get(&condition.key)
                .map(|kv| kv.mod_revision)
                .unwrap_or(Revision::ZERO);
            current == condition.expected_revision
        });
        if !holds {
            return TxnResponse {
                succeeded: false,
                results: Vec::new(),
                revision: self.revision,
            };
        }

        let revision = self.revision.next();
        let mut changed = false;
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                TxnOp::Range { key } => TxnOpResult::Range {
                    kvs: self.kvs.get(key).cloned().into_iter().collect(),
                },
                TxnOp::Put { key, value } => {
                    self.write(key, value, None, revision);
                    changed = true;
                    TxnOpResult::Put
                }
                TxnOp::Delete { key } => {
                    let deleted = self.remove(key);
                    changed |= deleted > 0;
                    TxnOpResult::Delete { deleted }
                }
            };
            results.push(result);
        }
        if changed {
            self.revision = revision;
        }

        TxnResponse {
            succeeded: true,
            results,
            revision: self.revision,
        }
    }

    pub(crate) fn lease_grant(&mut self, ttl_secs: i64) -> LeaseGrantResponse {
        let lease = LeaseId(self.next_lease);
        self.next_lease += 1;
        self.leases.insert(
            lease,
            Lease {
                ttl_secs,
                granted_at: Instant::now(),
                keys: BTreeSet::new(),
            },
        );
        LeaseGrantResponse {
            lease,
            ttl_secs,
            revision: self.revision,
        }
    }

    pub(crate) fn lease_revoke(&mut self, lease: LeaseId) -> Result<LeaseRevokeResponse, StoreError> {
        let removed = self
            .leases
            .remove(&lease)
            .ok_or(StoreError::LeaseNotFound(lease))?;

        let mut deleted = 0;
        for key in &removed.keys {
            if self.kvs.remove(key).is_some() {
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.revision = self.revision.next();
        }

        Ok(LeaseRevokeResponse {
            revision: self.revision,
        })
    }

    pub(crate) fn lease_time_to_live(
        &self,
        lease: LeaseId,
    ) -> Result<LeaseTimeToLiveResponse, StoreError> {
        let state = self
            .leases
            .get(&lease)
            .ok_or(StoreError::LeaseNotFound(lease))?;
        let elapsed = i64::try_from(state.granted_at.elapsed().as_secs()).unwrap_or(i64::MAX);
        Ok(LeaseTimeToLiveResponse {
            lease,
            ttl_secs: (state.ttl_secs - elapsed).max(0),
            granted_ttl_secs: state.ttl_secs,
        })
    }

    fn check_lease(&self, lease: Option<LeaseId>) -> Result<(), StoreError> {
        match lease {
            Some(id) if !self.leases.contains_key(&id) => Err(StoreError::LeaseNotFound(id)),
            _ => Ok(()),
        }
    }

    /// Write a key at `revision`, moving its lease attachment if needed.
    fn write(&mut self, key: &str, value: &str, lease: Option<LeaseId>, revision: Revision) {
        let previous = self.kvs.get(key).cloned();
        if let Some(old) = previous.as_ref().and_then(|kv| kv.lease) {
            if Some(old) != lease {
                self.detach(old, key);
            }
        }
        if let Some(id) = lease {
            if let Some(state) = self.leases.get_mut(&id) {
                state.keys.insert(key.to_string());
            }
        }

        let (create_revision, version) = match previous {
            Some(kv) => (kv.create_revision, kv.version + 1),
            None => (revision, 1),
        };
        self.kvs.insert(
            key.to_string(),
            KeyValue {
                key: key.to_string(),
                value: value.to_string(),
                mod_revision: revision,
                create_revision,
                version,
                lease,
            },
        );
    }

    fn remove(&mut self, key: &str) -> i64 {
        match self.kvs.remove(key) {
            Some(kv) => {
                if let Some(lease) = kv.lease {
                    self.detach(lease, key);
                }
                1
            }
            None => 0,
        }
    }

    fn detach(&mut self, lease: LeaseId, key: &str) {
        if let Some(state) = self.leases.get_mut(&lease) {
            state.keys.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cas(key: &str, expected: i64) -> Vec<Comparison> {
        vec![Comparison {
            key: key.into(),
            expected_revision: Revision(expected),
        }]
    }

    fn put_op(key: &str, value: &str) -> Vec<TxnOp> {
        vec![TxnOp::Put {
            key: key.into(),
            value: value.into(),
        }]
    }

    #[test]
    fn test_put_bumps_revision_and_version() {
        let mut state = StoreState::default();
        let first = state.put("a", "1", None).unwrap();
        let second = state.put("a", "2", None).unwrap();

        assert_eq!(second.revision, first.revision.next());
        let kv = state.get("a").kv.unwrap();
        assert_eq!(kv.value, "2");
        assert_eq!(kv.version, 2);
        assert_eq!(kv.create_revision, first.revision);
        assert_eq!(kv.mod_revision, second.revision);
    }

    #[test]
    fn test_delete_missing_key_keeps_revision() {
        let mut state = StoreState::default();
        let before = state.revision();
        let resp = state.delete("missing");

        assert_eq!(resp.deleted, 0);
        assert_eq!(resp.revision, before);
    }

    #[test]
    fn test_cas_on_missing_key_requires_zero_revision() {
        let mut state = StoreState::default();

        let resp = state.txn(&cas("a", 0), &put_op("a", "1"));
        assert!(resp.succeeded);

        let resp = state.txn(&cas("b", 5), &put_op("b", "1"));
        assert!(!resp.succeeded);
        assert!(state.get("b").kv.is_none());
    }

    #[test]
    fn test_failed_cas_does_not_advance_revision() {
        let mut state = StoreState::default();
        let written = state.put("a", "1", None).unwrap().revision;
        state.put("a", "2", None).unwrap();
        let before = state.revision();

        let resp = state.txn(&cas("a", written.0), &put_op("a", "3"));

        assert!(!resp.succeeded);
        assert_eq!(resp.revision, before);
        assert_eq!(state.revision(), before);
        assert_eq!(state.get("a").kv.unwrap().value, "2");
    }

    #[test]
    fn test_multi_op_txn_uses_single_revision() {
        let mut state = StoreState::default();
        let before = state.revision();
        let ops = vec![
            TxnOp::Put {
                key: "a".into(),
                value: "1".into(),
            },
            TxnOp::Put {
                key: "b".into(),
                value: "2".into(),
            },
            TxnOp::Range { key: "a".into() },
            TxnOp::Delete { key: "c".into() },
        ];

        let resp = state.txn(&[], &ops);

        assert!(resp.succeeded);
        assert_eq!(resp.revision, before.next());
        assert_eq!(state.get("a").kv.unwrap().mod_revision, before.next());
        assert_eq!(state.get("b").kv.unwrap().mod_revision, before.next());
        match &resp.results[2] {
            TxnOpResult::Range { kvs } => assert_eq!(kvs.len(), 1),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(resp.results[3], TxnOpResult::Delete { deleted: 0 });
    }

    #[test]
    fn test_read_only_txn_keeps_revision() {
        let mut state = StoreState::default();
        let before = state.revision();
        let resp = state.txn(&[], &[TxnOp::Range { key: "a".into() }]);
        assert!(resp.succeeded);
        assert_eq!(resp.revision, before);
    }

    #[test]
    fn test_range_by_prefix() {
        let mut state = StoreState::default();
        state.put("/registry/pods/default/a", "1", None).unwrap();
        state.put("/registry/pods/default/b", "1", None).unwrap();
        state.put("/registry/services/default/c", "1", None).unwrap();

        let resp = state.range("/registry/pods/");
        assert_eq!(resp.kvs.len(), 2);
        assert!(resp.kvs.iter().all(|kv| kv.key.starts_with("/registry/pods/")));
    }

    #[test]
    fn test_lease_revoke_deletes_attached_keys() {
        let mut state = StoreState::default();
        let lease = state.lease_grant(60).lease;
        state.put("a", "1", Some(lease)).unwrap();
        state.put("b", "1", None).unwrap();
        let before = state.revision();

        let resp = state.lease_revoke(lease).unwrap();

        assert_eq!(resp.revision, before.next());
        assert!(state.get("a").kv.is_none());
        assert!(state.get("b").kv.is_some());
        assert_eq!(
            state.lease_revoke(lease),
            Err(StoreError::LeaseNotFound(lease))
        );
    }

    #[test]
    fn test_put_with_unknown_lease_fails() {
        let mut state = StoreState::default();
        let before = state.revision();
        let result = state.put("a", "1", Some(LeaseId(1)));

        assert_eq!(result, Err(StoreError::LeaseNotFound(LeaseId(1))));
        assert_eq!(state.revision(), before);
    }

    #[test]
    fn test_overwrite_without_lease_detaches_key() {
        let mut state = StoreState::default();
        let lease = state.lease_grant(60).lease;
        state.put("a", "1", Some(lease)).unwrap();
        state.put("a", "2", None).unwrap();

        state.lease_revoke(lease).unwrap();
        assert_eq!(state.get("a").kv.unwrap().value, "2");
    }

    #[test]
    fn test_lease_time_to_live() {
        let mut state = StoreState::default();
        let lease = state.lease_grant(30).lease;

        let resp = state.lease_time_to_live(lease).unwrap();
        assert_eq!(resp.granted_ttl_secs, 30);
        assert!(resp.ttl_secs <= 30 && resp.ttl_secs >= 29);
        assert_eq!(state.lease_count(), 1);
    }
}
