//! Event sinks and subscriptions
//!
//! A subscriber is an opaque sink the lock manager pushes `OperationEvent`s
//! into. The SSE handler registers a `ChannelSink`; tests register their own
//! sinks. Sends must never block: broadcast runs under the shard write lock,
//! so a sink that cannot take an event immediately reports failure and is
//! evicted by the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shoal_core::OperationEvent;
use thiserror::Error;
use tokio::sync::mpsc;

/// Events buffered per SSE subscriber. A waiter that falls this far behind
/// the broadcast stream is treated as dead.
pub(crate) const SINK_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("subscriber closed")]
    Closed,
    #[error("subscriber buffer full")]
    Backpressure,
}

/// A destination for lock events. `send` is called with the shard lock held
/// and must not block; `close` must be safe to call more than once and
/// concurrently with `send`.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &OperationEvent) -> Result<(), SinkError>;
    fn close(&self);
}

/// A registered sink plus the identity used to unsubscribe it.
pub(crate) struct Subscription {
    pub(crate) id: u64,
    pub(crate) sink: Arc<dyn EventSink>,
}

/// Sink backed by a bounded tokio channel; the receiving half feeds an SSE
/// response stream. Dropping the subscription drops the sender, which ends
/// the receiver stream and with it the HTTP connection.
pub struct ChannelSink {
    tx: mpsc::Sender<OperationEvent>,
    closed: AtomicBool,
}

impl ChannelSink {
    /// Create a sink and the receiver the transport should drain.
    pub fn new() -> (Self, mpsc::Receiver<OperationEvent>) {
        let (tx, rx) = mpsc::channel(SINK_BUFFER);
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &OperationEvent) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
