//! REST API route handlers.
//!
//! Provides the streaming chat endpoint, thread inspection, and system
//! status.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use chatflow_agent::{Message, RunRequest, sse_frames};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Response payload for the `/api/status` endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub model: String,
    pub thread_count: usize,
    pub tool_count: usize,
    pub uptime_seconds: i64,
}

/// Return basic system status information.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let executor = &state.executor;
    Json(StatusResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        model: executor.config().model.clone(),
        thread_count: executor.checkpoints().len(),
        tool_count: executor.tools().tool_count(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}

// ---------------------------------------------------------------------------
// POST /api/chat
// ---------------------------------------------------------------------------

/// Request body for the `/api/chat` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    /// Client-side history; only seeds threads without a checkpoint.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// The new user message.
    pub new_message: String,

    /// Thread identifier.
    pub chat_id: String,
}

/// Run one turn and stream the reply as server-sent events.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequestBody>,
) -> Response {
    if body.chat_id.trim().is_empty() {
        return bad_request("chatId must not be empty");
    }
    if body.new_message.trim().is_empty() {
        return bad_request("newMessage must not be empty");
    }

    tracing::info!(
        thread_id = %body.chat_id,
        history = body.messages.len(),
        "chat request received"
    );

    let request = RunRequest::new(body.chat_id, vec![Message::user(body.new_message)])
        .with_history(body.messages);
    // The run is cancelled when the response body is dropped.
    let run = state.executor.start(request, CancellationToken::new());
    let frames = sse_frames(run).map(Ok::<_, Infallible>);

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

// ---------------------------------------------------------------------------
// Thread endpoints
// ---------------------------------------------------------------------------

/// A checkpointed thread.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResponse {
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
    pub runs: u64,
}

/// GET /api/threads/{id}: the committed messages of a thread.
pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.executor.checkpoints().snapshot(&id) {
        Some(cp) => (
            StatusCode::OK,
            Json(json!(ThreadResponse {
                thread_id: cp.thread_id,
                messages: cp.state.messages,
                updated_at: cp.updated_at,
                runs: cp.runs,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("thread {id} not found")})),
        ),
    }
}

/// DELETE /api/threads/{id}: forget a thread.
pub async fn delete_thread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.executor.checkpoints().remove(&id) {
        tracing::info!(thread_id = %id, "thread deleted");
        (StatusCode::OK, Json(json!({"deleted": true})))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("thread {id} not found")})),
        )
    }
}
