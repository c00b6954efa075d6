//! Liveness endpoint reporting the configured backends.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use endstate_core::config::GraphBackend;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub graph_backend: &'static str,
    pub llm_provider: String,
    pub llm_model: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let graph_backend = match state.config.graph.backend {
        GraphBackend::Neo4j => "neo4j",
        GraphBackend::Memory => "memory",
    };
    let provider = state.tutor.provider();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        graph_backend,
        llm_provider: provider.name().to_string(),
        llm_model: provider.model().to_string(),
    })
}
