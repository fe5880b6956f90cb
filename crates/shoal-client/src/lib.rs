//! Shoal Client Library
//!
//! The waiting-client side of the content-pull coordination protocol: a
//! retrying lock/unlock client plus the event-subscription state machine
//! that keeps waiters making progress when notifications are lost or the
//! holder disappears.

mod client;
mod error;
mod sse;

pub use client::{LockClient, LockOutcome};
pub use error::ClientError;

pub use shoal_core::{
    LockRequest, OperationEvent, OPERATION_DELETE, OPERATION_PULL, OPERATION_UPDATE,
};
