//! Lessons, assessments, and capstone evaluation.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use endstate_core::learning::{
    self, Assessment, AssessmentResult, AssessmentSubmission, CapstoneEvaluation,
    CapstoneSubmission, Lesson,
};
use endstate_core::{NodeStatus, SessionId, SkillNode};
use endstate_graph::ArtifactKind;
use endstate_llm::tutor::missed_concepts;
use endstate_plan::LearningGraph;

use super::{parse_session, ApiError, SessionQuery};
use crate::state::AppState;

/// A question as shown to the learner: no answer key.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub choices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssessmentView {
    pub node_id: String,
    pub questions: Vec<QuestionView>,
    pub generated_at: DateTime<Utc>,
}

impl From<&Assessment> for AssessmentView {
    fn from(a: &Assessment) -> Self {
        Self {
            node_id: a.node_id.clone(),
            questions: a
                .questions
                .iter()
                .map(|q| QuestionView {
                    id: q.id.clone(),
                    prompt: q.prompt.clone(),
                    choices: q.choices.clone(),
                    concept: q.concept.clone(),
                })
                .collect(),
            generated_at: a.generated_at,
        }
    }
}

/// A node together with its session graph, as needed for generation.
struct NodeContext {
    session_id: SessionId,
    node: SkillNode,
    graph: LearningGraph,
}

impl NodeContext {
    async fn load(state: &AppState, query: &SessionQuery, node_id: &str) -> Result<Self, ApiError> {
        let session_id = query.session_id()?;
        let graph = LearningGraph::from_skill_graph(&state.graph.session_graph(&session_id).await?);
        let node = graph.node(node_id)?.clone();
        Ok(Self {
            session_id,
            node,
            graph,
        })
    }

    fn prerequisite_names(&self) -> Result<Vec<String>, ApiError> {
        Ok(self
            .graph
            .prerequisites(&self.node.id)?
            .into_iter()
            .map(|n| n.name.clone())
            .collect())
    }

    /// First interaction with an available node starts it.
    async fn mark_started(&self, state: &AppState) -> Result<(), ApiError> {
        if self.node.status == NodeStatus::Available {
            state
                .graph
                .update_progress(&self.session_id, &self.node.id, NodeStatus::InProgress, None)
                .await?;
        }
        Ok(())
    }
}

pub async fn get_lesson(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Lesson>, ApiError> {
    let session_id = query.session_id()?;
    let lesson: Lesson = load_artifact(&state, &session_id, &node_id, ArtifactKind::Lesson)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No lesson generated for node {node_id}")))?;
    Ok(Json(lesson))
}

pub async fn generate_lesson(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Lesson>, ApiError> {
    let ctx = NodeContext::load(&state, &query, &node_id).await?;
    let prerequisites = ctx.prerequisite_names()?;

    let lesson = state.tutor.lesson(&ctx.node, &prerequisites).await?;
    save_artifact(&state, &ctx, ArtifactKind::Lesson, &lesson).await?;
    ctx.mark_started(&state).await?;

    tracing::info!(session_id = %ctx.session_id, node_id = %node_id, sections = lesson.sections.len(), "Lesson generated");
    Ok(Json(lesson))
}

pub async fn get_assessment(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<AssessmentView>, ApiError> {
    let session_id = query.session_id()?;
    let assessment: Assessment =
        load_artifact(&state, &session_id, &node_id, ArtifactKind::Assessment)
            .await?
            .ok_or_else(|| no_assessment(&node_id))?;
    Ok(Json(AssessmentView::from(&assessment)))
}

pub async fn generate_assessment(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<AssessmentView>, ApiError> {
    let ctx = NodeContext::load(&state, &query, &node_id).await?;
    let prerequisites = ctx.prerequisite_names()?;

    let assessment = state.tutor.assessment(&ctx.node, &prerequisites).await?;
    save_artifact(&state, &ctx, ArtifactKind::Assessment, &assessment).await?;
    ctx.mark_started(&state).await?;

    tracing::info!(session_id = %ctx.session_id, node_id = %node_id, questions = assessment.questions.len(), "Assessment generated");
    Ok(Json(AssessmentView::from(&assessment)))
}

/// Grade a submission against the stored assessment.
///
/// Passing marks the node mastered. Failing keeps it in progress and merges
/// remedial prerequisite nodes for the concepts the learner struggled with.
pub async fn submit_assessment(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<SessionQuery>,
    Json(submission): Json<AssessmentSubmission>,
) -> Result<Json<AssessmentResult>, ApiError> {
    let ctx = NodeContext::load(&state, &query, &node_id).await?;
    let assessment: Assessment =
        load_artifact(&state, &ctx.session_id, &node_id, ArtifactKind::Assessment)
            .await?
            .ok_or_else(|| no_assessment(&node_id))?;

    let graded = assessment.grade(&submission)?;
    let score = learning::score(&graded);
    let correct = graded.iter().filter(|g| g.correct).count();
    let passed = score >= state.config.learning.mastery_threshold;

    let status = if passed {
        NodeStatus::Mastered
    } else {
        NodeStatus::InProgress
    };
    state
        .graph
        .update_progress(&ctx.session_id, &node_id, status, Some(score))
        .await?;

    let mut remedial_nodes = Vec::new();
    if !passed {
        let concepts = match state.tutor.weak_concepts(&ctx.node, &assessment, &graded).await {
            Ok(concepts) if !concepts.is_empty() => concepts,
            Ok(_) => missed_concepts(&assessment, &graded),
            Err(e) => {
                tracing::warn!(node_id = %node_id, error = %e, "Weak-concept analysis failed; using question tags");
                missed_concepts(&assessment, &graded)
            }
        };
        let remedial = ctx.graph.remedial_for(&ctx.session_id, &node_id, &concepts)?;
        if !remedial.is_empty() {
            state.graph.merge_graph(&ctx.session_id, &remedial).await?;
        }
        remedial_nodes = remedial.nodes;
    }

    tracing::info!(
        session_id = %ctx.session_id,
        node_id = %node_id,
        score,
        passed,
        remedial = remedial_nodes.len(),
        "Assessment graded"
    );
    Ok(Json(AssessmentResult {
        node_id,
        score,
        correct,
        total: graded.len(),
        passed,
        graded,
        remedial_nodes,
    }))
}

pub async fn evaluate_capstone(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(submission): Json<CapstoneSubmission>,
) -> Result<Json<CapstoneEvaluation>, ApiError> {
    let session_id = parse_session(&raw)?;
    if submission.title.trim().is_empty() || submission.description.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "capstone submission needs a title and a description".to_string(),
        ));
    }
    let summary = state.graph.load_summary(&session_id).await?;

    let evaluation = state
        .tutor
        .evaluate_capstone(
            summary.as_ref(),
            &submission,
            state.config.learning.capstone_pass_score,
        )
        .await?;

    tracing::info!(session_id = %session_id, overall = evaluation.overall, passed = evaluation.passed, "Capstone evaluated");
    Ok(Json(evaluation))
}

async fn load_artifact<T: DeserializeOwned>(
    state: &AppState,
    session_id: &SessionId,
    node_id: &str,
    kind: ArtifactKind,
) -> Result<Option<T>, ApiError> {
    let Some(json) = state.graph.load_artifact(session_id, node_id, kind).await? else {
        return Ok(None);
    };
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|e| ApiError::Internal(format!("stored {kind:?} for node {node_id} is corrupt: {e}")))
}

async fn save_artifact<T: Serialize>(
    state: &AppState,
    ctx: &NodeContext,
    kind: ArtifactKind,
    value: &T,
) -> Result<(), ApiError> {
    let json = serde_json::to_string(value)
        .map_err(|e| ApiError::Internal(format!("failed to encode {kind:?}: {e}")))?;
    state
        .graph
        .save_artifact(&ctx.session_id, &ctx.node.id, kind, &json)
        .await?;
    Ok(())
}

fn no_assessment(node_id: &str) -> ApiError {
    ApiError::NotFound(format!("No assessment generated for node {node_id}"))
}
