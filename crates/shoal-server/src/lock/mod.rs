//! Lock Coordination Module
//!
//! The per-resource mutual-exclusion engine behind the HTTP surface:
//!
//! - `shard`: fixed power-of-two shard table routing keys by resource id
//! - `manager`: per-key state machine (held / queued / completed), FIFO wait
//!   queues, hand-off on failed release
//! - `subscriber`: event sinks and the per-key subscriber registry used to
//!   push completion and assignment events to waiting nodes

mod manager;
mod shard;
mod subscriber;

pub use manager::{LockDecision, LockInfo, LockManager, ManagerOptions};
pub use subscriber::{ChannelSink, EventSink, SinkError};
