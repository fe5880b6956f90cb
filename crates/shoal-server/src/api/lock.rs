//! Lock Endpoints
//!
//! `POST /lock` and `POST /unlock`. Both take a JSON body and answer with
//! JSON; malformed or incomplete bodies are 400, business-level refusals and
//! non-holder unlocks are 403. A queued waiter gets 200 with
//! `acquired=false` and is expected to open the SSE subscription.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shoal_core::{LockRequest, LockResponse, UnlockResponse};
use tracing::{debug, info};

use super::AppState;
use crate::lock::LockDecision;

fn parse_request(body: &Bytes) -> Result<LockRequest, Response> {
    let request: LockRequest = serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "malformed request body");
        (StatusCode::BAD_REQUEST, "invalid request body").into_response()
    })?;
    if request.op_type.is_empty() || request.resource_id.is_empty() || request.node_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "type, resource_id and node_id are required",
        )
            .into_response());
    }
    Ok(request)
}

/// POST /lock - acquire the lock or join the wait queue
#[tracing::instrument(skip(state, body))]
pub async fn lock(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        op_type = %request.op_type,
        resource_id = %request.resource_id,
        node_id = %request.node_id,
        "lock request"
    );

    let response = match state.manager.try_lock(request) {
        LockDecision::Acquired => (
            StatusCode::OK,
            Json(LockResponse {
                acquired: true,
                skip: false,
                message: "lock acquired".to_string(),
                error: String::new(),
            }),
        ),
        LockDecision::Queued => (
            StatusCode::OK,
            Json(LockResponse {
                acquired: false,
                skip: false,
                message: "lock held; queued behind current holder".to_string(),
                error: String::new(),
            }),
        ),
        LockDecision::Retry => (
            StatusCode::OK,
            Json(LockResponse {
                acquired: false,
                skip: false,
                message: "previous holder finished; re-request the lock".to_string(),
                error: String::new(),
            }),
        ),
        LockDecision::Refused(reason) => (
            StatusCode::FORBIDDEN,
            Json(LockResponse {
                acquired: false,
                skip: false,
                message: reason.clone(),
                error: reason,
            }),
        ),
    };
    response.into_response()
}

/// POST /unlock - release a held lock
///
/// The request's `error` field doubles as the outcome report: empty means
/// the holder's operation succeeded.
#[tracing::instrument(skip(state, body))]
pub async fn unlock(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        op_type = %request.op_type,
        resource_id = %request.resource_id,
        node_id = %request.node_id,
        success = request.error.is_empty(),
        "unlock request"
    );

    if state.manager.unlock(&request) {
        (
            StatusCode::OK,
            Json(UnlockResponse {
                released: true,
                message: "lock released".to_string(),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(UnlockResponse {
                released: false,
                message: "not released: no such lock or caller is not the holder".to_string(),
            }),
        )
            .into_response()
    }
}
