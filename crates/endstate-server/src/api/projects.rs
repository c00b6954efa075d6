//! Project suggestion, summary, and skill-graph generation endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use endstate_core::types::{ProjectSuggestion, ProjectSummary, ProjectSummaryPatch};
use endstate_core::{ChatMessage, SessionId};

use super::{parse_session, ApiError, SessionQuery};
use crate::jobs::{JobKind, JobStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub session_id: String,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub session_id: SessionId,
    pub projects: Vec<ProjectSuggestion>,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub session_id: SessionId,
    pub job: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub session_id: SessionId,
    pub jobs: Vec<JobStatus>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub session_id: SessionId,
    pub deleted_nodes: u64,
    pub summary_deleted: bool,
}

pub async fn get_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let session_id = query.session_id()?;
    let projects = state
        .suggestions
        .read()
        .await
        .get(&session_id)
        .cloned()
        .unwrap_or_default();
    Ok(Json(SuggestionsResponse {
        session_id,
        projects,
    }))
}

pub async fn suggest_projects(
    State(state): State<AppState>,
    Json(body): Json<SuggestRequest>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let session_id = parse_session(&body.session_id)?;
    let history = history_of(&state, &session_id).await;

    let projects = state
        .jobs
        .run(
            &session_id,
            JobKind::Suggestions,
            state.tutor.suggest_projects(&history, &body.interests),
        )
        .await?;

    tracing::info!(session_id = %session_id, count = projects.len(), "Project suggestions generated");
    state
        .suggestions
        .write()
        .await
        .insert(session_id.clone(), projects.clone());
    Ok(Json(SuggestionsResponse {
        session_id,
        projects,
    }))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<ProjectSummary>, ApiError> {
    let session_id = parse_session(&raw)?;
    state
        .graph
        .load_summary(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| no_summary(&session_id))
}

/// Queue summary extraction and skill-graph generation.
///
/// A stored summary at least as new as the last chat message is used as is,
/// so manual edits made through PATCH are not overwritten.
pub async fn generate_project(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let session_id = parse_session(&raw)?;
    let history = history_of(&state, &session_id).await;
    let existing = state.graph.load_summary(&session_id).await?;
    if history.is_empty() && existing.is_none() {
        return Err(ApiError::BadRequest(
            "session has no messages and no project summary".to_string(),
        ));
    }
    let current = existing.filter(|summary| {
        history
            .last()
            .map_or(true, |last| summary.updated_at >= last.timestamp)
    });

    let task_state = state.clone();
    let task_session = session_id.clone();
    let job = state
        .jobs
        .submit(&session_id, JobKind::Graph, async move {
            let summary = match current {
                Some(summary) => summary,
                None => task_state.update_summary(&task_session, &history).await?,
            };
            let graph = task_state
                .tutor
                .extract_graph(&task_session, &summary)
                .await?;
            task_state.graph.merge_graph(&task_session, &graph).await?;
            tracing::info!(
                session_id = %task_session,
                nodes = graph.nodes.len(),
                edges = graph.edges.len(),
                "Skill graph generated"
            );
            Ok::<(), ApiError>(())
        })
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobResponse { session_id, job }),
    ))
}

pub async fn patch_project(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(patch): Json<ProjectSummaryPatch>,
) -> Result<Json<ProjectSummary>, ApiError> {
    let session_id = parse_session(&raw)?;
    let mut summary = state
        .graph
        .load_summary(&session_id)
        .await?
        .ok_or_else(|| no_summary(&session_id))?;
    if patch.is_empty() {
        return Ok(Json(summary));
    }
    patch.apply(&mut summary);
    state.graph.save_summary(&summary).await?;
    tracing::info!(session_id = %session_id, "Project summary patched");
    Ok(Json(summary))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let session_id = parse_session(&raw)?;
    let deleted_nodes = state.graph.delete_session_graph(&session_id).await?;
    let summary_deleted = state.graph.delete_summary(&session_id).await?;
    state.suggestions.write().await.remove(&session_id);
    state.jobs.clear(&session_id).await;

    tracing::info!(session_id = %session_id, deleted_nodes, summary_deleted, "Project deleted");
    Ok(Json(DeleteResponse {
        session_id,
        deleted_nodes,
        summary_deleted,
    }))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<JobsResponse>, ApiError> {
    let session_id = parse_session(&raw)?;
    let jobs = state.jobs.list(&session_id).await;
    Ok(Json(JobsResponse { session_id, jobs }))
}

async fn history_of(state: &AppState, session_id: &SessionId) -> Vec<ChatMessage> {
    match state.sessions.get(session_id).await {
        Some(session) => session.history().await,
        None => Vec::new(),
    }
}

fn no_summary(session_id: &SessionId) -> ApiError {
    ApiError::NotFound(format!("No project summary for session {session_id}"))
}
