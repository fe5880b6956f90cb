//! Shared wire types for the shoal content-pull coordinator
//!
//! Everything that crosses the HTTP boundary between the coordinator and its
//! clients lives here: lock requests and responses, unlock responses, and the
//! operation events pushed over the SSE stream. Both `shoal-server` and
//! `shoal-client` depend on this crate so the two sides can never drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pull a blob into the local store.
pub const OPERATION_PULL: &str = "pull";
/// Replace an existing blob.
pub const OPERATION_UPDATE: &str = "update";
/// Remove a blob from the store.
pub const OPERATION_DELETE: &str = "delete";

/// Build the mutual-exclusion key for an operation on a resource.
///
/// The key identifies one lock; different operation types on the same
/// resource are distinct locks, but the server routes them to the same shard
/// by hashing `resource_id` alone.
pub fn lock_key(op_type: &str, resource_id: &str) -> String {
    format!("{op_type}:{resource_id}")
}

/// A lock or unlock request, as POSTed to `/lock` and `/unlock`.
///
/// `error` is only meaningful on unlock: an empty error means the holder's
/// operation succeeded. The server never accepts a separate success flag, so
/// `success == (error == "")` holds by construction on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    #[serde(rename = "type")]
    pub op_type: String,
    pub resource_id: String,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl LockRequest {
    pub fn new(
        op_type: impl Into<String>,
        resource_id: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            op_type: op_type.into(),
            resource_id: resource_id.into(),
            node_id: node_id.into(),
            error: String::new(),
        }
    }

    /// Attach a holder-reported failure for an unlock request.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    /// The mutual-exclusion key this request contends on.
    pub fn key(&self) -> String {
        lock_key(&self.op_type, &self.resource_id)
    }
}

/// Response to `POST /lock`.
///
/// `skip` is reserved: older coordinator revisions used it to tell callers
/// the operation had already completed, and it stays on the wire for
/// compatibility. The current coordinator always sends `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockResponse {
    pub acquired: bool,
    pub skip: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: String,
}

/// Response to `POST /unlock`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub released: bool,
    #[serde(default)]
    pub message: String,
}

/// Event broadcast to subscribers of a lock key.
///
/// Two families share this shape:
///
/// - completion: the holder unlocked; `node_id` is the holder and `success`
///   reflects its outcome (`error` carries the failure text, if any);
/// - assignment: a failed unlock promoted the queue head; `node_id` is the
///   promoted node, `success` is `false` and `error` is empty.
///
/// Waiters tell assignment apart from a plain failure broadcast by comparing
/// `node_id` against their own identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    #[serde(rename = "type")]
    pub op_type: String,
    pub resource_id: String,
    pub node_id: String,
    pub success: bool,
    #[serde(default)]
    pub error: String,
    pub completed_at: DateTime<Utc>,
}

impl OperationEvent {
    /// Whether this event concerns the given request's lock key.
    pub fn matches(&self, request: &LockRequest) -> bool {
        self.op_type == request.op_type && self.resource_id == request.resource_id
    }
}
