//! Core types for robustness traffic.
//!
//! Identifiers, the request/response model of the store under test, and the
//! operation history handed to an external linearizability checker.

mod error;
mod history;
mod identifiers;
mod operation;

pub use error::{HistoryError, StoreError};
pub use history::{History, OperationRecord};
pub use identifiers::{ClientId, LeaseId, RequestId, Revision, Timestamp};
pub use operation::{
    Comparison, DeleteResponse, GetResponse, KeyValue, LeaseGrantResponse, LeaseRevokeResponse,
    LeaseTimeToLiveResponse, OperationKind, PutResponse, RangeResponse, Request, Response, TxnOp,
    TxnOpResult, TxnResponse,
};
