//! HTTP API: router, error mapping, and shared extractors.

pub mod chat;
pub mod graph;
pub mod health;
pub mod learning;
pub mod projects;
pub mod stream;

use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use endstate_core::config::ServerConfig;
use endstate_core::{EndstateError, SessionId};
use endstate_graph::GraphError;
use endstate_llm::LlmError;
use endstate_plan::PlanError;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);

    Router::new()
        .route("/api/health", get(health::health))
        // Chat
        .route(
            "/api/chat/:session_id/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/api/chat/:session_id/stream", get(stream::stream))
        .route("/api/chat/:session_id/reset", post(chat::reset))
        // Projects
        .route(
            "/api/suggest-projects",
            get(projects::get_suggestions).post(projects::suggest_projects),
        )
        .route(
            "/api/projects/:session_id",
            get(projects::get_project)
                .post(projects::generate_project)
                .patch(projects::patch_project)
                .delete(projects::delete_project),
        )
        .route("/api/projects/:session_id/jobs", get(projects::list_jobs))
        // Graph
        .route("/api/graph", get(graph::get_graph))
        .route("/api/graph/stats", get(graph::get_stats))
        .route("/api/graph/path", get(graph::get_path))
        // Learning
        .route(
            "/api/nodes/:node_id/lesson",
            get(learning::get_lesson).post(learning::generate_lesson),
        )
        .route(
            "/api/nodes/:node_id/assessment",
            get(learning::get_assessment).post(learning::generate_assessment),
        )
        .route(
            "/api/nodes/:node_id/assessment/submit",
            post(learning::submit_assessment),
        )
        .route("/api/capstone/:session_id", post(learning::evaluate_capstone))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The LLM provider failed or returned unusable output.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<GraphError> for ApiError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::NotFound { id, .. } => ApiError::NotFound(format!("Node not found: {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

impl From<EndstateError> for ApiError {
    fn from(e: EndstateError) -> Self {
        match e {
            EndstateError::InvalidSession(_) | EndstateError::Validation(_) => {
                ApiError::BadRequest(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::Cycle { .. } => ApiError::Conflict(e.to_string()),
            PlanError::NodeNotFound { node_id } => {
                ApiError::NotFound(format!("Node not found: {node_id}"))
            }
        }
    }
}

// ── Shared Extractors ────────────────────────────────────────────

/// `?session_id=` on routes not scoped by a path segment.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

impl SessionQuery {
    pub fn session_id(&self) -> Result<SessionId, ApiError> {
        let raw = self
            .session_id
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("session_id query parameter is required".to_string()))?;
        Ok(SessionId::parse(raw)?)
    }
}

pub fn parse_session(raw: &str) -> Result<SessionId, ApiError> {
    Ok(SessionId::parse(raw)?)
}
