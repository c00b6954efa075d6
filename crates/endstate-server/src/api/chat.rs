//! Chat endpoints: send, poll, and reset.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use endstate_core::{ChatMessage, SessionId};

use super::{parse_session, ApiError};
use crate::session::{ChatSession, MessageReceipt, TurnStart};
use crate::state::AppState;

/// Idempotency key header. A retried send with the same value is not re-processed.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    #[serde(flatten)]
    pub receipt: MessageReceipt,
    pub duplicate: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Only messages strictly newer than this timestamp.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub session_id: SessionId,
    pub messages: Vec<ChatMessage>,
    pub processing: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub session_id: SessionId,
    pub cleared: usize,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SendMessage>,
) -> Result<(StatusCode, Json<SendResponse>), ApiError> {
    let session_id = parse_session(&raw)?;
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let session = state.sessions.get_or_create(&session_id).await;
    match session.begin_turn(content, &request_id).await {
        TurnStart::Duplicate(receipt) => {
            tracing::info!(session_id = %session_id, request_id = %request_id, "Duplicate request ignored");
            Ok((
                StatusCode::OK,
                Json(SendResponse {
                    receipt,
                    duplicate: true,
                }),
            ))
        }
        TurnStart::Busy { request_id: current } => Err(ApiError::Conflict(format!(
            "Session is busy processing request {current}"
        ))),
        TurnStart::Accepted { receipt, history } => {
            let task = tokio::spawn(run_turn(
                state.clone(),
                session.clone(),
                request_id.clone(),
                history,
            ));
            session.attach_task(&request_id, task.abort_handle()).await;
            tracing::info!(session_id = %session_id, request_id = %request_id, "Chat turn started");
            Ok((
                StatusCode::ACCEPTED,
                Json(SendResponse {
                    receipt,
                    duplicate: false,
                }),
            ))
        }
    }
}

/// Ask the tutor for a reply and publish the outcome.
async fn run_turn(
    state: AppState,
    session: Arc<ChatSession>,
    request_id: String,
    history: Vec<ChatMessage>,
) {
    let started = std::time::Instant::now();
    let outcome = state.tutor.reply(&history).await.map_err(|e| {
        tracing::warn!(session_id = %session.id(), request_id = %request_id, error = %e, "Chat turn failed");
        format!("The tutor could not respond: {e}")
    });

    let completed = session.finish_turn(&request_id, outcome).await;
    if completed {
        tracing::info!(
            session_id = %session.id(),
            request_id = %request_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Chat turn complete"
        );
        if state.config.learning.auto_summarize {
            state.refresh_summary(session.id()).await;
        }
    }
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let session_id = parse_session(&raw)?;
    let (messages, processing) = match state.sessions.get(&session_id).await {
        Some(session) => session.snapshot(query.since).await,
        None => (Vec::new(), false),
    };
    Ok(Json(MessagesResponse {
        session_id,
        messages,
        processing,
    }))
}

pub async fn reset(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<ResetResponse>, ApiError> {
    let session_id = parse_session(&raw)?;
    let cleared = match state.sessions.get(&session_id).await {
        Some(session) => session.reset().await,
        None => 0,
    };
    tracing::info!(session_id = %session_id, cleared, "Chat session reset");
    Ok(Json(ResetResponse {
        session_id,
        cleared,
    }))
}
