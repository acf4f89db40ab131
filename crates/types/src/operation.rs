//! Request and response model of the store under test.
//!
//! A [`Request`] describes what a client asked for and a [`Response`] what the
//! store answered. Both are carried by every [`OperationRecord`](crate::OperationRecord)
//! so an external checker can replay the call against a key-value model.

use crate::{LeaseId, Revision};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stored key with its revision metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    /// Revision of the last modification of this key.
    pub mod_revision: Revision,
    /// Revision at which the key was created.
    pub create_revision: Revision,
    /// Number of modifications since creation.
    pub version: i64,
    /// Lease the key is attached to, if any.
    pub lease: Option<LeaseId>,
}

/// Condition of a transaction: the key's modification revision must equal
/// `expected_revision` (zero for "key must not exist").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub key: String,
    pub expected_revision: Revision,
}

/// One operation inside a multi-operation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnOp {
    Range { key: String },
    Put { key: String, value: String },
    Delete { key: String },
}

impl TxnOp {
    /// Whether this operation modifies the store.
    pub fn is_write(&self) -> bool {
        !matches!(self, TxnOp::Range { .. })
    }

    /// The key this operation touches.
    pub fn key(&self) -> &str {
        match self {
            TxnOp::Range { key } | TxnOp::Put { key, .. } | TxnOp::Delete { key } => key,
        }
    }
}

/// Result of one [`TxnOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnOpResult {
    Range { kvs: Vec<KeyValue> },
    Put,
    Delete { deleted: i64 },
}

/// A call issued to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Get {
        key: String,
    },
    Range {
        prefix: String,
    },
    Put {
        key: String,
        value: String,
        lease: Option<LeaseId>,
    },
    Delete {
        key: String,
    },
    Txn {
        conditions: Vec<Comparison>,
        ops: Vec<TxnOp>,
    },
    LeaseGrant {
        ttl_secs: i64,
    },
    LeaseRevoke {
        lease: LeaseId,
    },
    LeaseTimeToLive {
        lease: LeaseId,
    },
    Defragment,
}

impl Request {
    /// Kind of this request.
    pub fn kind(&self) -> OperationKind {
        match self {
            Request::Get { .. } => OperationKind::Get,
            Request::Range { .. } => OperationKind::Range,
            Request::Put { .. } => OperationKind::Put,
            Request::Delete { .. } => OperationKind::Delete,
            Request::Txn { .. } => OperationKind::Txn,
            Request::LeaseGrant { .. } => OperationKind::LeaseGrant,
            Request::LeaseRevoke { .. } => OperationKind::LeaseRevoke,
            Request::LeaseTimeToLive { .. } => OperationKind::LeaseTimeToLive,
            Request::Defragment => OperationKind::Defragment,
        }
    }

    /// Keys this request reads or writes. Empty for lease and maintenance calls.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Request::Get { key } | Request::Put { key, .. } | Request::Delete { key } => {
                vec![key.as_str()]
            }
            Request::Range { prefix } => vec![prefix.as_str()],
            Request::Txn { conditions, ops } => conditions
                .iter()
                .map(|c| c.key.as_str())
                .chain(ops.iter().map(TxnOp::key))
                .collect(),
            Request::LeaseGrant { .. }
            | Request::LeaseRevoke { .. }
            | Request::LeaseTimeToLive { .. }
            | Request::Defragment => Vec::new(),
        }
    }
}

/// Operation category, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Get,
    Range,
    Put,
    Delete,
    Txn,
    LeaseGrant,
    LeaseRevoke,
    LeaseTimeToLive,
    Defragment,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Get => "get",
            OperationKind::Range => "range",
            OperationKind::Put => "put",
            OperationKind::Delete => "delete",
            OperationKind::Txn => "txn",
            OperationKind::LeaseGrant => "lease-grant",
            OperationKind::LeaseRevoke => "lease-revoke",
            OperationKind::LeaseTimeToLive => "lease-ttl",
            OperationKind::Defragment => "defragment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub kv: Option<KeyValue>,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeResponse {
    pub kvs: Vec<KeyValue>,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResponse {
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: i64,
    pub revision: Revision,
}

/// Response of a transaction.
///
/// `succeeded` reports whether all conditions held; when false no operation
/// was applied and `results` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnResponse {
    pub succeeded: bool,
    pub results: Vec<TxnOpResult>,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseGrantResponse {
    pub lease: LeaseId,
    pub ttl_secs: i64,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRevokeResponse {
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseTimeToLiveResponse {
    pub lease: LeaseId,
    /// Remaining lifetime in seconds.
    pub ttl_secs: i64,
    pub granted_ttl_secs: i64,
}

/// Response of a successful store call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Get(GetResponse),
    Range(RangeResponse),
    Put(PutResponse),
    Delete(DeleteResponse),
    Txn(TxnResponse),
    LeaseGrant(LeaseGrantResponse),
    LeaseRevoke(LeaseRevokeResponse),
    LeaseTimeToLive(LeaseTimeToLiveResponse),
    Defragment,
}

impl Response {
    /// Store revision observed by this response, if the call reports one.
    pub fn revision(&self) -> Option<Revision> {
        match self {
            Response::Get(r) => Some(r.revision),
            Response::Range(r) => Some(r.revision),
            Response::Put(r) => Some(r.revision),
            Response::Delete(r) => Some(r.revision),
            Response::Txn(r) => Some(r.revision),
            Response::LeaseGrant(r) => Some(r.revision),
            Response::LeaseRevoke(r) => Some(r.revision),
            Response::LeaseTimeToLive(_) | Response::Defragment => None,
        }
    }
}

macro_rules! impl_into_response {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Response {
                fn from(response: $ty) -> Self {
                    Response::$variant(response)
                }
            }
        )*
    };
}

impl_into_response! {
    Get => GetResponse,
    Range => RangeResponse,
    Put => PutResponse,
    Delete => DeleteResponse,
    Txn => TxnResponse,
    LeaseGrant => LeaseGrantResponse,
    LeaseRevoke => LeaseRevokeResponse,
    LeaseTimeToLive => LeaseTimeToLiveResponse,
}

impl From<()> for Response {
    fn from(_: ()) -> Self {
        Response::Defragment
    }
}
