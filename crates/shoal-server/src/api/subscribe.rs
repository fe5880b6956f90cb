//! Event Subscription Endpoint
//!
//! `GET /lock/subscribe?type=…&resource_id=…` answers with a Server-Sent
//! Events stream carrying one `data: <json OperationEvent>` frame per event.
//! The subscription lives exactly as long as the HTTP connection: the
//! response stream owns a guard that unsubscribes on drop, and a subscriber
//! evicted by the manager has its channel closed, which ends the stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{sse::Event, IntoResponse, Sse},
};
use futures::Stream;
use serde::Deserialize;
use shoal_core::OperationEvent;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::AppState;
use crate::lock::{ChannelSink, LockManager};

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    #[serde(rename = "type", default)]
    op_type: String,
    #[serde(default)]
    resource_id: String,
}

/// GET /lock/subscribe - stream operation events for one lock key
#[tracing::instrument(skip(state))]
pub async fn subscribe(
    State(state): State<AppState>,
    Query(params): Query<SubscribeParams>,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    if params.op_type.is_empty() || params.resource_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "type and resource_id query parameters are required",
        ));
    }

    debug!(
        op_type = %params.op_type,
        resource_id = %params.resource_id,
        "subscribe request"
    );

    let (sink, rx) = ChannelSink::new();
    let Some(id) = state
        .manager
        .subscribe(&params.op_type, &params.resource_id, Arc::new(sink))
    else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "subscriber limit reached for this resource",
        ));
    };

    let stream = EventStream {
        inner: ReceiverStream::new(rx),
        _guard: SubscriptionGuard {
            manager: state.manager.clone(),
            op_type: params.op_type,
            resource_id: params.resource_id,
            id,
        },
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream),
    ))
}

/// Unsubscribes when the SSE response is dropped, whether the client hung up
/// or the server is tearing the connection down.
struct SubscriptionGuard {
    manager: Arc<LockManager>,
    op_type: String,
    resource_id: String,
    id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        debug!(
            op_type = %self.op_type,
            resource_id = %self.resource_id,
            subscriber_id = self.id,
            "subscriber disconnected"
        );
        self.manager
            .unsubscribe(&self.op_type, &self.resource_id, self.id);
    }
}

struct EventStream {
    inner: ReceiverStream<OperationEvent>,
    _guard: SubscriptionGuard,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => match Event::default().json_data(&event) {
                Ok(frame) => Poll::Ready(Some(Ok(frame))),
                Err(e) => {
                    warn!(error = %e, "failed to encode operation event, closing stream");
                    Poll::Ready(None)
                }
            },
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
