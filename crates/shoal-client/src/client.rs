//! Lock client
//!
//! The waiting side of the protocol. A `lock` call either returns holding
//! the lock or with a definitive reason not to work, combining three
//! mechanisms:
//!
//! - a retrying `POST /lock` with a short timeout,
//! - a long-lived SSE subscription that delivers completion and assignment
//!   events, and
//! - a periodic re-request tick that makes progress even when an event is
//!   lost or the previous holder crashed without unlocking.
//!
//! Dropping an in-flight `lock` or `unlock` future cancels it; every
//! suspension point is a tokio or reqwest await.

use std::time::Duration;

use futures::StreamExt;
use reqwest::{header, StatusCode};
use shoal_core::{LockRequest, LockResponse, OperationEvent, UnlockResponse};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::{is_retryable, ClientError};
use crate::sse::EventBuffer;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(1);

/// How a `lock` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller holds the lock and must call [`LockClient::unlock`].
    Acquired,
    /// Another node completed the operation successfully; the resource is
    /// observable through the shared read view and no work is needed.
    CompletedElsewhere,
    /// The coordinator refused the request, or the failure another node
    /// reported was broadcast with an error. Carries the reason.
    Refused(String),
}

enum PostOutcome {
    Acquired,
    Refused(String),
    Waiting,
}

enum EventAction {
    Done(LockOutcome),
    Resubscribe,
    KeepReading,
}

/// HTTP client for the coordinator.
///
/// Holds two underlying clients: a short one with a request timeout for
/// `/lock` and `/unlock`, and a long one without any timeout for the SSE
/// subscription, which legitimately stays open for as long as a peer's
/// download runs.
#[derive(Debug, Clone)]
pub struct LockClient {
    server_url: String,
    node_id: String,
    short: reqwest::Client,
    long: reqwest::Client,
    max_retries: u32,
    retry_interval: Duration,
    requeue_interval: Duration,
}

impl LockClient {
    pub fn new(
        server_url: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            node_id: node_id.into(),
            short: reqwest::Client::builder()
                .timeout(DEFAULT_REQUEST_TIMEOUT)
                .build()?,
            long: reqwest::Client::builder().build()?,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
        })
    }

    /// Like [`LockClient::new`] with a generated node identity, for callers
    /// that do not carry one of their own.
    pub fn with_generated_node_id(server_url: impl Into<String>) -> Result<Self, ClientError> {
        let node_id = format!("shoal-node-{}", uuid::Uuid::new_v4());
        Self::new(server_url, node_id)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Cadence of the safety-net re-request while waiting.
    pub fn with_requeue_interval(mut self, interval: Duration) -> Self {
        self.requeue_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ClientError> {
        self.short = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Acquire the lock for `request`, waiting on peers as needed.
    ///
    /// Returns exactly one of: [`LockOutcome::Acquired`] (caller owns the
    /// lock and must unlock), [`LockOutcome::CompletedElsewhere`],
    /// [`LockOutcome::Refused`], or an error after transport retries are
    /// exhausted. The request's `node_id` is overwritten with this client's
    /// identity.
    pub async fn lock(&self, request: &LockRequest) -> Result<LockOutcome, ClientError> {
        let mut request = request.clone();
        request.node_id = self.node_id.clone();
        request.error.clear();

        let mut last = match self.lock_attempt(&request).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if is_retryable(&e) => e,
            Err(e) => return Err(e),
        };
        for attempt in 1..=self.max_retries {
            warn!(attempt, error = %last, "lock attempt failed, retrying");
            tokio::time::sleep(self.retry_interval).await;
            match self.lock_attempt(&request).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if is_retryable(&e) => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(ClientError::RetriesExhausted {
            attempts: self.max_retries + 1,
            source: Box::new(last),
        })
    }

    /// Release a lock acquired through [`LockClient::lock`]. Set the
    /// request's `error` to the failure text when the operation did not
    /// succeed; an empty error reports success.
    pub async fn unlock(&self, request: &LockRequest) -> Result<(), ClientError> {
        let mut request = request.clone();
        request.node_id = self.node_id.clone();

        let mut last = match self.unlock_attempt(&request).await {
            Ok(()) => return Ok(()),
            Err(e) if is_retryable(&e) => e,
            Err(e) => return Err(e),
        };
        for attempt in 1..=self.max_retries {
            warn!(attempt, error = %last, "unlock attempt failed, retrying");
            tokio::time::sleep(self.retry_interval).await;
            match self.unlock_attempt(&request).await {
                Ok(()) => return Ok(()),
                Err(e) if is_retryable(&e) => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(ClientError::RetriesExhausted {
            attempts: self.max_retries + 1,
            source: Box::new(last),
        })
    }

    async fn lock_attempt(&self, request: &LockRequest) -> Result<LockOutcome, ClientError> {
        match self.post_lock(request).await? {
            PostOutcome::Acquired => Ok(LockOutcome::Acquired),
            PostOutcome::Refused(reason) => Ok(LockOutcome::Refused(reason)),
            PostOutcome::Waiting => self.wait_for_lock(request).await,
        }
    }

    async fn post_lock(&self, request: &LockRequest) -> Result<PostOutcome, ClientError> {
        let response = self
            .short
            .post(format!("{}/lock", self.server_url))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus { status, body });
        }
        let lock_response: LockResponse = response.json().await?;
        if !lock_response.error.is_empty() {
            return Ok(PostOutcome::Refused(lock_response.error));
        }
        if lock_response.acquired {
            return Ok(PostOutcome::Acquired);
        }
        Ok(PostOutcome::Waiting)
    }

    async fn unlock_attempt(&self, request: &LockRequest) -> Result<(), ClientError> {
        let response = self
            .short
            .post(format!("{}/unlock", self.server_url))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus { status, body });
        }
        let unlock_response: UnlockResponse = response.json().await?;
        if !unlock_response.released {
            return Err(ClientError::UnlockRejected(unlock_response.message));
        }
        Ok(())
    }

    /// Park on the event stream until something decisive happens.
    ///
    /// The periodic re-request keeps this loop live across every failure
    /// mode events cannot cover: a lost notification, a holder that crashed
    /// without unlocking, a promotion that raced the subscription.
    async fn wait_for_lock(&self, request: &LockRequest) -> Result<LockOutcome, ClientError> {
        let mut tick = tokio::time::interval(self.requeue_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; the first probe belongs one period out
        tick.tick().await;

        'resubscribe: loop {
            let response = self
                .long
                .get(format!("{}/lock/subscribe", self.server_url))
                .query(&[
                    ("type", request.op_type.as_str()),
                    ("resource_id", request.resource_id.as_str()),
                ])
                .header(header::ACCEPT, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .send()
                .await?;
            let status = response.status();
            if status != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                return Err(ClientError::UnexpectedStatus { status, body });
            }

            let mut stream = Box::pin(response.bytes_stream());
            let mut buffer = EventBuffer::new();

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Some(outcome) = self.probe(request).await {
                            return Ok(outcome);
                        }
                    }
                    chunk = stream.next() => match chunk {
                        Some(Ok(bytes)) => {
                            for event in buffer.push(&bytes) {
                                match self.handle_event(request, &event).await? {
                                    EventAction::Done(outcome) => return Ok(outcome),
                                    EventAction::Resubscribe => continue 'resubscribe,
                                    EventAction::KeepReading => {}
                                }
                            }
                        }
                        Some(Err(e)) => {
                            debug!(error = %e, "event stream read failed");
                            if let Some(outcome) = self.probe(request).await {
                                return Ok(outcome);
                            }
                            return Err(ClientError::Transport(e));
                        }
                        None => {
                            // the server closed the stream; one last chance
                            // that the lock is already ours
                            if let Some(outcome) = self.probe(request).await {
                                return Ok(outcome);
                            }
                            return Err(ClientError::StreamEnded);
                        }
                    }
                }
            }
        }
    }

    /// Re-request the lock while waiting. Only an acquisition is decisive;
    /// transport failures here are logged and absorbed, the subscription
    /// and the next tick carry on.
    async fn probe(&self, request: &LockRequest) -> Option<LockOutcome> {
        match self.post_lock(request).await {
            Ok(PostOutcome::Acquired) => Some(LockOutcome::Acquired),
            Ok(PostOutcome::Refused(_)) | Ok(PostOutcome::Waiting) => None,
            Err(e) => {
                debug!(error = %e, "re-request probe failed");
                None
            }
        }
    }

    async fn handle_event(
        &self,
        request: &LockRequest,
        event: &OperationEvent,
    ) -> Result<EventAction, ClientError> {
        if !event.matches(request) {
            return Ok(EventAction::KeepReading);
        }
        if !event.error.is_empty() {
            return Ok(EventAction::Done(LockOutcome::Refused(event.error.clone())));
        }
        if event.success {
            debug!(
                node_id = %event.node_id,
                resource_id = %event.resource_id,
                "peer completed the operation"
            );
            return Ok(EventAction::Done(LockOutcome::CompletedElsewhere));
        }
        if event.node_id != self.node_id {
            // assigned to another node; reopen the stream and keep waiting
            return Ok(EventAction::Resubscribe);
        }

        // The coordinator promoted this node; the follow-up request is
        // answered by the same-node refresh.
        debug!(resource_id = %event.resource_id, "lock assigned, re-requesting");
        match self.post_lock(request).await? {
            PostOutcome::Acquired => Ok(EventAction::Done(LockOutcome::Acquired)),
            PostOutcome::Refused(reason) => Ok(EventAction::Done(LockOutcome::Refused(reason))),
            PostOutcome::Waiting => Ok(EventAction::Resubscribe),
        }
    }
}
