//! Lock Manager
//!
//! Per-key mutual exclusion with FIFO hand-off. Every state transition for a
//! key happens under its shard's write lock, which is what makes the rules
//! below checkable:
//!
//! - at most one `LockInfo` with `completed == false` per key
//! - a request is either the holder or a queue entry, never both
//! - broadcast order equals state-transition order
//! - the holder only changes by successful release (entry deleted) or by
//!   failed release promoting the queue head (entry replaced atomically)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shoal_core::{lock_key, LockRequest, OperationEvent};
use tracing::{debug, warn};

use super::shard::{ShardState, ShardTable};
use super::subscriber::{EventSink, Subscription};
use crate::observability::metrics;

/// State of a held lock. Exists iff the key is held; `completed == true` is
/// transient and never survives the shard lock that set it.
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub request: LockRequest,
    /// Server-assigned arrival time of the holding request.
    pub timestamp: DateTime<Utc>,
    pub acquired_at: DateTime<Utc>,
    pub completed: bool,
    pub success: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LockInfo {
    fn held(request: LockRequest, timestamp: DateTime<Utc>, acquired_at: DateTime<Utc>) -> Self {
        Self {
            request,
            timestamp,
            acquired_at,
            completed: false,
            success: false,
            completed_at: None,
        }
    }
}

/// A wait-queue entry: the request plus its server-assigned arrival time.
/// Queue position equals arrival order under the shard lock.
#[derive(Debug, Clone)]
pub(crate) struct QueuedRequest {
    pub(crate) request: LockRequest,
    pub(crate) timestamp: DateTime<Utc>,
}

/// What `try_lock` decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockDecision {
    /// Caller is now the holder and must unlock when done.
    Acquired,
    /// Held by another node; caller was appended to the wait queue.
    Queued,
    /// A stale completed entry was reaped; caller was not enqueued and
    /// should re-request.
    Retry,
    /// Business-level refusal; the caller must not wait.
    Refused(String),
}

/// Construction options for [`LockManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Number of shards; must be a power of two.
    pub shard_count: usize,
    /// When off, a request for a held key is refused instead of queued.
    pub multi_node: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            shard_count: 32,
            multi_node: true,
        }
    }
}

/// Upper bound on subscriptions per key. A key attracting more waiters than
/// this is misbehaving; further subscriptions are rejected rather than
/// growing the registry without limit.
const MAX_SUBSCRIBERS_PER_KEY: usize = 1024;

/// The sharded per-resource lock engine. Cheap to share: all state lives
/// behind per-shard reader/writer locks.
pub struct LockManager {
    shards: ShardTable,
    multi_node: bool,
    next_subscriber_id: AtomicU64,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(ManagerOptions::default())
    }
}

impl LockManager {
    pub fn new(options: ManagerOptions) -> Self {
        Self {
            shards: ShardTable::new(options.shard_count),
            multi_node: options.multi_node,
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Try to acquire the lock for `request`'s key.
    ///
    /// The request's arrival timestamp is assigned here, under the shard
    /// lock, so queue order and timestamp order cannot disagree.
    pub fn try_lock(&self, request: LockRequest) -> LockDecision {
        let key = request.key();
        let shard = self.shards.shard_for(&request.resource_id);
        let mut guard = shard.state.write().unwrap_or_else(|e| e.into_inner());
        let state = &mut *guard;
        let now = Utc::now();

        let Some(info) = state.locks.get_mut(&key) else {
            debug!(key = %key, node_id = %request.node_id, "lock acquired");
            metrics::record_lock_acquired(&request.op_type);
            state
                .locks
                .insert(key, LockInfo::held(request, now, now));
            return LockDecision::Acquired;
        };

        if info.completed {
            // Salvage: a completed entry was never reaped. Normal control
            // flow removes entries inside unlock, so reaching this means a
            // release raced shutdown or a future lease expiry path. Treat
            // the key as free, hand it to the queue head, and make the
            // caller re-request so it observes the fresh state.
            warn!(key = %key, node_id = %request.node_id, "reaping stale completed lock");
            state.locks.remove(&key);
            if let Some(promoted) = Self::promote_head(state, &key, now) {
                let event = Self::assignment_event(&promoted, now);
                Self::broadcast(state, &key, &event);
            }
            return LockDecision::Retry;
        }

        if info.request.node_id == request.node_id {
            // The promoted queue head re-requests before it knows it is the
            // holder; answer yes and take its latest request as canonical.
            debug!(key = %key, node_id = %request.node_id, "holder re-request, refreshing");
            metrics::record_lock_refreshed(&request.op_type);
            info.request = request;
            info.timestamp = now;
            info.acquired_at = now;
            return LockDecision::Acquired;
        }

        if !self.multi_node {
            debug!(key = %key, node_id = %request.node_id, "refused, multi-node mode off");
            metrics::record_lock_refused(&request.op_type);
            return LockDecision::Refused("multi-node mode off; held elsewhere".to_string());
        }

        debug!(
            key = %key,
            node_id = %request.node_id,
            holder = %info.request.node_id,
            "lock held, queueing waiter"
        );
        metrics::record_lock_queued(&request.op_type);
        state
            .queues
            .entry(key)
            .or_default()
            .push_back(QueuedRequest {
                request,
                timestamp: now,
            });
        LockDecision::Queued
    }

    /// Release a held lock. `request.error` empty means the holder's
    /// operation succeeded. Returns `false` when no lock exists for the key
    /// or the caller is not the holder; state is untouched in that case.
    pub fn unlock(&self, request: &LockRequest) -> bool {
        let key = request.key();
        let shard = self.shards.shard_for(&request.resource_id);
        let mut guard = shard.state.write().unwrap_or_else(|e| e.into_inner());
        let state = &mut *guard;
        let now = Utc::now();

        let Some(info) = state.locks.get_mut(&key) else {
            debug!(key = %key, node_id = %request.node_id, "unlock for unheld key");
            return false;
        };
        if info.request.node_id != request.node_id {
            debug!(
                key = %key,
                node_id = %request.node_id,
                holder = %info.request.node_id,
                "unlock from non-holder"
            );
            return false;
        }

        let success = request.error.is_empty();
        info.completed = true;
        info.success = success;
        info.completed_at = Some(now);
        metrics::record_lock_released(&request.op_type, success);

        if success {
            // The resource is now observable through the merged read view,
            // so waiters either stop on the completion event or re-request
            // against a free key. Promoting them here would force spurious
            // acquisitions, hence the queue is dropped with the lock.
            debug!(key = %key, node_id = %request.node_id, "released, operation succeeded");
            let event = Self::completion_event(request, true, now);
            Self::broadcast(state, &key, &event);
            state.locks.remove(&key);
            state.queues.remove(&key);
        } else {
            debug!(
                key = %key,
                node_id = %request.node_id,
                error = %request.error,
                "released, operation failed"
            );
            state.locks.remove(&key);
            match Self::promote_head(state, &key, now) {
                Some(promoted) => {
                    let event = Self::assignment_event(&promoted, now);
                    Self::broadcast(state, &key, &event);
                }
                None => {
                    let event = Self::completion_event(request, false, now);
                    Self::broadcast(state, &key, &event);
                }
            }
        }

        true
    }

    /// Wait-queue length for a key, for monitoring.
    pub fn queue_length(&self, op_type: &str, resource_id: &str) -> usize {
        let key = lock_key(op_type, resource_id);
        let shard = self.shards.shard_for(resource_id);
        let guard = shard.state.read().unwrap_or_else(|e| e.into_inner());
        guard.queues.get(&key).map_or(0, |q| q.len())
    }

    /// Snapshot of the held-lock state for a key, for monitoring.
    pub fn lock_info(&self, op_type: &str, resource_id: &str) -> Option<LockInfo> {
        let key = lock_key(op_type, resource_id);
        let shard = self.shards.shard_for(resource_id);
        let guard = shard.state.read().unwrap_or_else(|e| e.into_inner());
        guard.locks.get(&key).cloned()
    }

    /// Register `sink` for events on a key. Returns the subscription id to
    /// pass to [`LockManager::unsubscribe`], or `None` when the key is at
    /// its subscriber limit. Registration takes the shard write lock, so a
    /// subscriber can never miss an event emitted after its `subscribe`
    /// returns.
    pub fn subscribe(
        &self,
        op_type: &str,
        resource_id: &str,
        sink: Arc<dyn EventSink>,
    ) -> Option<u64> {
        let key = lock_key(op_type, resource_id);
        let shard = self.shards.shard_for(resource_id);
        let mut guard = shard.state.write().unwrap_or_else(|e| e.into_inner());
        let subs = guard.subscribers.entry(key.clone()).or_default();
        if subs.len() >= MAX_SUBSCRIBERS_PER_KEY {
            warn!(key = %key, limit = MAX_SUBSCRIBERS_PER_KEY, "subscriber limit reached");
            return None;
        }
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        subs.push(Subscription { id, sink });
        debug!(key = %key, subscriber_id = id, subscribers = subs.len(), "subscriber added");
        metrics::adjust_subscribers(1);
        Some(id)
    }

    /// Remove a subscription. A no-op when the subscriber was already
    /// evicted or unsubscribed.
    pub fn unsubscribe(&self, op_type: &str, resource_id: &str, id: u64) {
        let key = lock_key(op_type, resource_id);
        let shard = self.shards.shard_for(resource_id);
        let mut guard = shard.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(subs) = guard.subscribers.get_mut(&key) else {
            return;
        };
        let before = subs.len();
        subs.retain(|sub| {
            if sub.id == id {
                sub.sink.close();
                false
            } else {
                true
            }
        });
        if subs.len() < before {
            debug!(key = %key, subscriber_id = id, remaining = subs.len(), "subscriber removed");
            metrics::adjust_subscribers(-1);
        }
        if subs.is_empty() {
            guard.subscribers.remove(&key);
        }
    }

    /// Total subscriptions across all shards, for monitoring.
    pub fn subscriber_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let guard = shard.state.read().unwrap_or_else(|e| e.into_inner());
                guard.subscribers.values().map(Vec::len).sum::<usize>()
            })
            .sum()
    }

    /// Pop the queue head and install it as holder. Caller must hold the
    /// shard write lock and have removed the previous entry.
    fn promote_head(
        state: &mut ShardState,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<LockRequest> {
        let queue = state.queues.get_mut(key)?;
        let next = queue.pop_front()?;
        let remaining = queue.len();
        if remaining == 0 {
            state.queues.remove(key);
        }
        debug!(
            key = %key,
            node_id = %next.request.node_id,
            remaining = remaining,
            "promoting queue head"
        );
        metrics::record_promotion(&next.request.op_type);
        state.locks.insert(
            key.to_string(),
            LockInfo::held(next.request.clone(), next.timestamp, now),
        );
        Some(next.request)
    }

    /// Deliver `event` to every subscriber of `key`, evicting sinks that
    /// fail. Sends are non-blocking, so holding the shard lock here keeps
    /// broadcast order equal to state-transition order without stalling the
    /// shard.
    fn broadcast(state: &mut ShardState, key: &str, event: &OperationEvent) {
        let Some(subs) = state.subscribers.get_mut(key) else {
            return;
        };
        let before = subs.len();
        subs.retain(|sub| match sub.sink.send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    key = %key,
                    subscriber_id = sub.id,
                    error = %e,
                    "send failed, evicting subscriber"
                );
                sub.sink.close();
                false
            }
        });
        let evicted = before - subs.len();
        metrics::record_events_broadcast(subs.len(), evicted);
        if subs.is_empty() {
            state.subscribers.remove(key);
        }
    }

    fn completion_event(request: &LockRequest, success: bool, now: DateTime<Utc>) -> OperationEvent {
        OperationEvent {
            op_type: request.op_type.clone(),
            resource_id: request.resource_id.clone(),
            node_id: request.node_id.clone(),
            success,
            error: request.error.clone(),
            completed_at: now,
        }
    }

    /// Assignment events carry the promoted node and an empty error; waiters
    /// recognize themselves by the `node_id` match.
    fn assignment_event(promoted: &LockRequest, now: DateTime<Utc>) -> OperationEvent {
        OperationEvent {
            op_type: promoted.op_type.clone(),
            resource_id: promoted.resource_id.clone(),
            node_id: promoted.node_id.clone(),
            success: false,
            error: String::new(),
            completed_at: now,
        }
    }

    /// Plant a completed-but-unreaped entry, the state the salvage branch in
    /// [`LockManager::try_lock`] recovers from.
    #[cfg(test)]
    pub(crate) fn plant_completed(&self, request: LockRequest, success: bool) {
        let key = request.key();
        let shard = self.shards.shard_for(&request.resource_id);
        let mut guard = shard.state.write().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        guard.locks.insert(
            key,
            LockInfo {
                request,
                timestamp: now,
                acquired_at: now,
                completed: true,
                success,
                completed_at: Some(now),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::subscriber::SinkError;
    use shoal_core::{OPERATION_DELETE, OPERATION_PULL};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    fn request(node: &str) -> LockRequest {
        LockRequest::new(OPERATION_PULL, "sha256:test123", node)
    }

    /// Collects events; optionally fails every send to exercise eviction.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<OperationEvent>>,
        fail: AtomicBool,
        closed: AtomicBool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail: AtomicBool::new(true),
                ..Default::default()
            }
        }

        fn events(&self) -> Vec<OperationEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn send(&self, event: &OperationEvent) -> Result<(), SinkError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(SinkError::Closed);
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Relaxed);
        }
    }

    #[test]
    fn solo_acquire_and_release_leaves_no_state() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);

        let info = lm.lock_info(OPERATION_PULL, "sha256:test123").unwrap();
        assert_eq!(info.request.node_id, "A");
        assert!(!info.completed);

        assert!(lm.unlock(&request("A")));
        assert!(lm.lock_info(OPERATION_PULL, "sha256:test123").is_none());
        assert_eq!(lm.queue_length(OPERATION_PULL, "sha256:test123"), 0);
    }

    #[test]
    fn contender_queues_in_fifo_order() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert_eq!(lm.try_lock(request("B")), LockDecision::Queued);
        assert_eq!(lm.try_lock(request("C")), LockDecision::Queued);
        assert_eq!(lm.queue_length(OPERATION_PULL, "sha256:test123"), 2);

        // Failure hand-off pops B first, then C.
        assert!(lm.unlock(&request("A").with_error("disk full")));
        assert_eq!(
            lm.lock_info(OPERATION_PULL, "sha256:test123")
                .unwrap()
                .request
                .node_id,
            "B"
        );
        assert!(lm.unlock(&request("B").with_error("disk full")));
        assert_eq!(
            lm.lock_info(OPERATION_PULL, "sha256:test123")
                .unwrap()
                .request
                .node_id,
            "C"
        );
    }

    #[test]
    fn holder_rerequest_is_idempotent_and_keeps_queue() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert_eq!(lm.try_lock(request("B")), LockDecision::Queued);

        // Duplicate requests from the holder, as after a promotion race.
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert_eq!(lm.queue_length(OPERATION_PULL, "sha256:test123"), 1);
    }

    #[test]
    fn success_release_discards_queue() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert_eq!(lm.try_lock(request("B")), LockDecision::Queued);
        assert_eq!(lm.try_lock(request("C")), LockDecision::Queued);

        assert!(lm.unlock(&request("A")));

        // Nobody inherited the lock and the queue is gone; both waiters go
        // through fresh acquisition.
        assert!(lm.lock_info(OPERATION_PULL, "sha256:test123").is_none());
        assert_eq!(lm.queue_length(OPERATION_PULL, "sha256:test123"), 0);
        assert_eq!(lm.try_lock(request("C")), LockDecision::Acquired);
        assert_eq!(lm.try_lock(request("B")), LockDecision::Queued);

        // A failure release must promote C's successor B, not a pre-success
        // queue entry.
        assert!(lm.unlock(&request("C").with_error("checksum mismatch")));
        assert_eq!(
            lm.lock_info(OPERATION_PULL, "sha256:test123")
                .unwrap()
                .request
                .node_id,
            "B"
        );
    }

    #[test]
    fn success_release_broadcasts_completion_to_all_subscribers() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);

        let b = Arc::new(RecordingSink::default());
        let c = Arc::new(RecordingSink::default());
        lm.subscribe(OPERATION_PULL, "sha256:test123", b.clone()).unwrap();
        lm.subscribe(OPERATION_PULL, "sha256:test123", c.clone()).unwrap();

        assert!(lm.unlock(&request("A")));

        for sink in [&b, &c] {
            let events = sink.events();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].node_id, "A");
            assert!(events[0].success);
            assert_eq!(events[0].error, "");
        }
    }

    #[test]
    fn failure_release_with_queue_emits_assignment_only() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert_eq!(lm.try_lock(request("B")), LockDecision::Queued);
        assert_eq!(lm.try_lock(request("C")), LockDecision::Queued);

        let b = Arc::new(RecordingSink::default());
        let c = Arc::new(RecordingSink::default());
        lm.subscribe(OPERATION_PULL, "sha256:test123", b.clone()).unwrap();
        lm.subscribe(OPERATION_PULL, "sha256:test123", c.clone()).unwrap();

        assert!(lm.unlock(&request("A").with_error("disk full")));

        // Both waiters see the same assignment event naming B; the holder's
        // error text never reaches them.
        for sink in [&b, &c] {
            let events = sink.events();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].node_id, "B");
            assert!(!events[0].success);
            assert_eq!(events[0].error, "");
        }
        assert_eq!(lm.queue_length(OPERATION_PULL, "sha256:test123"), 1);
    }

    #[test]
    fn failure_release_with_empty_queue_broadcasts_failure() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);

        let sink = Arc::new(RecordingSink::default());
        lm.subscribe(OPERATION_PULL, "sha256:test123", sink.clone()).unwrap();

        assert!(lm.unlock(&request("A").with_error("disk full")));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].node_id, "A");
        assert!(!events[0].success);
        assert_eq!(events[0].error, "disk full");
        assert!(lm.lock_info(OPERATION_PULL, "sha256:test123").is_none());
    }

    #[test]
    fn unlock_rejects_non_holder_and_unheld_keys() {
        let lm = LockManager::default();
        assert!(!lm.unlock(&request("A")));

        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert!(!lm.unlock(&request("B")));
        assert_eq!(
            lm.lock_info(OPERATION_PULL, "sha256:test123")
                .unwrap()
                .request
                .node_id,
            "A"
        );

        // Double unlock: the first releases, the second finds nothing.
        assert!(lm.unlock(&request("A")));
        assert!(!lm.unlock(&request("A")));
    }

    #[test]
    fn single_node_mode_refuses_instead_of_queueing() {
        let lm = LockManager::new(ManagerOptions {
            multi_node: false,
            ..Default::default()
        });
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert_eq!(
            lm.try_lock(request("B")),
            LockDecision::Refused("multi-node mode off; held elsewhere".to_string())
        );
        assert_eq!(lm.queue_length(OPERATION_PULL, "sha256:test123"), 0);

        // The holder itself still refreshes fine.
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
    }

    #[test]
    fn stale_completed_entry_is_reaped_and_head_promoted() {
        let lm = LockManager::default();
        lm.plant_completed(request("A"), true);
        assert_eq!(lm.try_lock(request("B")), LockDecision::Retry);
        // Not enqueued by the salvage path; the follow-up request wins.
        assert!(lm.lock_info(OPERATION_PULL, "sha256:test123").is_none());
        assert_eq!(lm.try_lock(request("B")), LockDecision::Acquired);
    }

    #[test]
    fn stale_completed_entry_hands_off_to_waiting_queue() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert_eq!(lm.try_lock(request("B")), LockDecision::Queued);

        let b = Arc::new(RecordingSink::default());
        lm.subscribe(OPERATION_PULL, "sha256:test123", b.clone()).unwrap();

        // Simulate the unreaped completion, then a third node's request
        // triggering the salvage.
        lm.plant_completed(request("A"), true);
        assert_eq!(lm.try_lock(request("C")), LockDecision::Retry);

        let info = lm.lock_info(OPERATION_PULL, "sha256:test123").unwrap();
        assert_eq!(info.request.node_id, "B");
        let events = b.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].node_id, "B");
        assert!(!events[0].success);
    }

    #[test]
    fn failing_subscriber_is_evicted_without_losing_others() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);

        let dead = Arc::new(RecordingSink::failing());
        let live = Arc::new(RecordingSink::default());
        lm.subscribe(OPERATION_PULL, "sha256:test123", dead.clone()).unwrap();
        lm.subscribe(OPERATION_PULL, "sha256:test123", live.clone()).unwrap();
        assert_eq!(lm.subscriber_count(), 2);

        assert!(lm.unlock(&request("A")));

        assert!(dead.closed.load(Ordering::Relaxed));
        assert_eq!(live.events().len(), 1);
        assert_eq!(lm.subscriber_count(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let lm = LockManager::default();
        let sink = Arc::new(RecordingSink::default());
        let id = lm.subscribe(OPERATION_PULL, "sha256:test123", sink.clone()).unwrap();

        lm.unsubscribe(OPERATION_PULL, "sha256:test123", id);
        assert!(sink.closed.load(Ordering::Relaxed));
        assert_eq!(lm.subscriber_count(), 0);

        // Second removal, and removal for a key with no subscribers at all.
        lm.unsubscribe(OPERATION_PULL, "sha256:test123", id);
        lm.unsubscribe(OPERATION_DELETE, "sha256:other", 999);
    }

    #[test]
    fn subscription_limit_is_enforced_per_key() {
        let lm = LockManager::default();
        let sink = Arc::new(RecordingSink::default());
        for _ in 0..MAX_SUBSCRIBERS_PER_KEY {
            assert!(lm
                .subscribe(OPERATION_PULL, "sha256:test123", sink.clone())
                .is_some());
        }
        assert!(lm
            .subscribe(OPERATION_PULL, "sha256:test123", sink.clone())
            .is_none());
        // Other keys are unaffected.
        assert!(lm
            .subscribe(OPERATION_PULL, "sha256:other", sink.clone())
            .is_some());
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let lm = LockManager::default();
        assert_eq!(lm.try_lock(request("A")), LockDecision::Acquired);
        assert!(lm.unlock(&request("A")));

        let sink = Arc::new(RecordingSink::default());
        lm.subscribe(OPERATION_PULL, "sha256:test123", sink.clone()).unwrap();
        assert!(sink.events().is_empty());

        // It does get the next cycle's event.
        assert_eq!(lm.try_lock(request("B")), LockDecision::Acquired);
        assert!(lm.unlock(&request("B")));
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].node_id, "B");
    }

    #[test]
    fn operation_types_are_independent_locks() {
        let lm = LockManager::default();
        let pull = LockRequest::new(OPERATION_PULL, "sha256:test123", "A");
        let delete = LockRequest::new(OPERATION_DELETE, "sha256:test123", "B");
        assert_eq!(lm.try_lock(pull), LockDecision::Acquired);
        assert_eq!(lm.try_lock(delete), LockDecision::Acquired);
        assert_eq!(
            lm.lock_info(OPERATION_DELETE, "sha256:test123")
                .unwrap()
                .request
                .node_id,
            "B"
        );
    }

    #[test]
    fn concurrent_contenders_admit_exactly_one_holder() {
        let lm = Arc::new(LockManager::default());
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let lm = lm.clone();
                std::thread::spawn(move || {
                    lm.try_lock(request(&format!("node-{i}"))) == LockDecision::Acquired
                })
            })
            .collect();
        let acquired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&acquired| acquired)
            .count();
        assert_eq!(acquired, 1);
        assert_eq!(lm.queue_length(OPERATION_PULL, "sha256:test123"), 9);
    }
}
