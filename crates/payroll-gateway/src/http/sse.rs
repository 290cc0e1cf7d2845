//! Real-time feed endpoints under `/api/sse`.
//!
//! `connect` keeps the response open and writes one `data: <json>` frame per
//! hub event. The remaining routes are plain JSON request/response.

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse,
    },
    Json,
};
use payroll_core::PayrollError;
use payroll_events::Subscription;
use payroll_protocol::event::now_timestamp;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, sync::Arc};
use tracing::{debug, info};

use crate::app::AppState;
use crate::auth::AdminPrincipal;
use crate::http::error::{api_error, ApiError};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_TEST_MESSAGE: &str = "Test SSE event";
const DEFAULT_PUBLIC_TEST_MESSAGE: &str = "Public test SSE event";

/// GET /api/sse/connect, admin stream, keyed by the caller's username.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    AdminPrincipal(principal): AdminPrincipal,
) -> Result<impl IntoResponse, ApiError> {
    open_stream(&state, principal.subject)
}

/// GET /api/sse/connect-public, unauthenticated stream for testing.
pub async fn connect_public(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let subscriber_id = public_subscriber_id();
    open_stream(&state, subscriber_id)
}

/// `public_<millis>_<suffix>`; the random suffix keeps same-millisecond joins apart.
fn public_subscriber_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "public_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

fn open_stream(state: &AppState, subscriber_id: String) -> Result<impl IntoResponse, ApiError> {
    let sub = state
        .hub
        .add_connection(subscriber_id)
        .map_err(|e| api_error(&PayrollError::from(e)))?;
    info!(conn_id = sub.id(), subscriber_id = %sub.subscriber_id(), "sse stream opened");

    Ok((
        [
            ("cache-control", "no-cache"),
            ("x-accel-buffering", "no"),
        ],
        Sse::new(frames(sub)),
    ))
}

/// Forward hub events until the subscription closes. Dropping the stream
/// (client went away) drops the subscription, which deregisters it.
fn frames(
    mut sub: Subscription,
) -> impl futures_util::Stream<Item = Result<SseEvent, Infallible>> {
    async_stream::stream! {
        while let Some(event) = sub.recv().await {
            yield Ok(SseEvent::default().data(event.to_json()));
        }
        debug!(conn_id = sub.id(), "sse stream ended by hub");
    }
}

/// GET /api/sse/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminPrincipal,
) -> Json<Value> {
    Json(json!({ "success": true, "data": state.hub.stats() }))
}

#[derive(Deserialize, Default)]
struct TestBody {
    message: Option<String>,
}

/// Missing, empty or unparseable bodies all fall back to the default message.
fn test_message(body: &Bytes, default: &str) -> String {
    serde_json::from_slice::<TestBody>(body)
        .unwrap_or_default()
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// POST /api/sse/test
pub async fn send_test(
    State(state): State<Arc<AppState>>,
    AdminPrincipal(principal): AdminPrincipal,
    body: Bytes,
) -> Json<Value> {
    let message = test_message(&body, DEFAULT_TEST_MESSAGE);
    let id = state
        .hub
        .send_test_event(format!("{message} (sent by {})", principal.subject));
    info!(sender = %principal.subject, ?id, "test event requested");

    Json(json!({
        "success": true,
        "message": "Test event sent successfully",
        "data": { "message": message, "sender": principal.subject },
    }))
}

/// POST /api/sse/test-public
pub async fn send_test_public(State(state): State<Arc<AppState>>, body: Bytes) -> Json<Value> {
    let message = test_message(&body, DEFAULT_PUBLIC_TEST_MESSAGE);
    state.hub.send_test_event(message.clone());

    Json(json!({
        "success": true,
        "message": "Public test event sent successfully",
        "data": { "message": message },
    }))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    limit: Option<String>,
}

fn history_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
}

/// GET /api/sse/history?limit=N
pub async fn history(
    State(state): State<Arc<AppState>>,
    _admin: AdminPrincipal,
    Query(query): Query<HistoryQuery>,
) -> Json<Value> {
    let events = state.hub.history(history_limit(query.limit.as_deref()));
    Json(json!({ "success": true, "count": events.len(), "data": events }))
}

/// GET /api/sse/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "service": "payroll-events",
        "timestamp": now_timestamp(),
        "connections": state.hub.connection_count(),
    }))
}
