//! Read-only skill graph endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use endstate_core::types::GraphView;
use endstate_core::{GraphStats, SessionId};
use endstate_plan::{LearningGraph, PlanStep};

use super::{ApiError, SessionQuery};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PathResponse {
    pub session_id: SessionId,
    pub steps: Vec<PlanStep>,
    /// Unlocked, not yet mastered node IDs in study order.
    pub next: Vec<String>,
}

pub async fn get_graph(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<GraphView>, ApiError> {
    let session_id = query.session_id()?;
    let graph = state.graph.session_graph(&session_id).await?;
    Ok(Json(graph.to_view()))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<GraphStats>, ApiError> {
    let session_id = query.session_id()?;
    Ok(Json(state.graph.graph_stats(&session_id).await?))
}

pub async fn get_path(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<PathResponse>, ApiError> {
    let session_id = query.session_id()?;
    let graph = state.graph.session_graph(&session_id).await?;
    let learning = LearningGraph::from_skill_graph(&graph);

    let steps = learning.learning_order()?;
    let next = learning
        .next_available()
        .into_iter()
        .map(|n| n.id.clone())
        .collect();
    Ok(Json(PathResponse {
        session_id,
        steps,
        next,
    }))
}
