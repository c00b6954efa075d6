//! The `Tutor` facade: one method per kind of generation.

use std::sync::Arc;

use chrono::Utc;

use endstate_core::learning::{
    capstone_rubric, Assessment, CapstoneEvaluation, CapstoneSubmission, GradedQuestion, Lesson,
    Question,
};
use endstate_core::types::{ProjectSuggestion, ProjectSummary};
use endstate_core::{ChatMessage, SessionId, SkillGraph, SkillNode};

use crate::error::{LlmError, Result};
use crate::extract::{
    graph_from_extraction, parse_json, AssessmentExtraction, CapstoneExtraction, GraphExtraction,
    LessonExtraction, SuggestionsExtraction, SummaryExtraction, WeakConceptsExtraction,
};
use crate::prompts;
use crate::provider::{CompletionRequest, LlmProvider};

/// Temperature for structured extraction, where creativity only hurts.
const EXTRACTION_TEMPERATURE: f32 = 0.2;

const QUESTIONS_PER_ASSESSMENT: usize = 5;

#[derive(Clone)]
pub struct Tutor {
    provider: Arc<dyn LlmProvider>,
    history_window: usize,
}

impl Tutor {
    pub fn new(provider: Arc<dyn LlmProvider>, history_window: usize) -> Self {
        Self {
            provider,
            history_window: history_window.max(1),
        }
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// The tutor's next chat message given the conversation so far.
    pub async fn reply(&self, history: &[ChatMessage]) -> Result<String> {
        let request = CompletionRequest::new(prompts::TUTOR_SYSTEM)
            .with_messages(self.window(history).to_vec());
        let completion = self.provider.complete(request).await?;
        let content = completion.content.trim();
        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content.to_string())
    }

    /// Extract the project summary from a conversation.
    pub async fn summarize(
        &self,
        session_id: &SessionId,
        history: &[ChatMessage],
    ) -> Result<ProjectSummary> {
        let raw: SummaryExtraction = self
            .structured(prompts::summary_system(), prompts::transcript(history))
            .await?;
        let mut summary = ProjectSummary::empty(session_id.clone());
        summary.user_profile = raw.user_profile;
        summary.agreed_project = raw.agreed_project;
        summary.topics = raw.topics;
        summary.skills = raw.skills;
        summary.concepts = raw.concepts;
        Ok(summary)
    }

    pub async fn suggest_projects(
        &self,
        history: &[ChatMessage],
        interests: &[String],
    ) -> Result<Vec<ProjectSuggestion>> {
        let user = if history.is_empty() {
            "No conversation yet.".to_string()
        } else {
            prompts::transcript(self.window(history))
        };
        let raw: SuggestionsExtraction = self
            .structured(prompts::suggestions_system(interests), user)
            .await?;
        Ok(raw
            .projects
            .into_iter()
            .filter(|p| !p.title.trim().is_empty())
            .collect())
    }

    /// Generate the skill graph for a summary. Output outside the schema is dropped.
    pub async fn extract_graph(
        &self,
        session_id: &SessionId,
        summary: &ProjectSummary,
    ) -> Result<SkillGraph> {
        let raw: GraphExtraction = self
            .structured(prompts::graph_system(), prompts::graph_user(summary))
            .await?;
        Ok(graph_from_extraction(session_id, raw))
    }

    pub async fn lesson(&self, node: &SkillNode, prerequisites: &[String]) -> Result<Lesson> {
        let raw: LessonExtraction = self
            .structured(
                prompts::lesson_system(),
                prompts::node_user(node, prerequisites),
            )
            .await?;
        Ok(Lesson {
            node_id: node.id.clone(),
            title: raw.title,
            summary: raw.summary,
            objectives: raw.objectives,
            sections: raw.sections,
            generated_at: Utc::now(),
        })
    }

    /// Generate a multiple-choice assessment. Malformed questions are dropped.
    pub async fn assessment(&self, node: &SkillNode, prerequisites: &[String]) -> Result<Assessment> {
        let raw: AssessmentExtraction = self
            .structured(
                prompts::assessment_system(QUESTIONS_PER_ASSESSMENT),
                prompts::node_user(node, prerequisites),
            )
            .await?;
        let assessment = Assessment {
            node_id: node.id.clone(),
            questions: raw
                .questions
                .into_iter()
                .enumerate()
                .map(|(i, q)| Question {
                    id: format!("q{}", i + 1),
                    prompt: q.prompt,
                    choices: q.choices,
                    answer_index: q.answer_index,
                    concept: q.concept,
                })
                .collect(),
            generated_at: Utc::now(),
        }
        .sanitized();

        if assessment.questions.is_empty() {
            return Err(LlmError::Parse("assessment has no usable questions".to_string()));
        }
        Ok(assessment)
    }

    /// Concepts to review after a failed assessment.
    ///
    /// Returns an empty list without calling the model when nothing was missed.
    pub async fn weak_concepts(
        &self,
        node: &SkillNode,
        assessment: &Assessment,
        graded: &[GradedQuestion],
    ) -> Result<Vec<String>> {
        let missed: Vec<&Question> = assessment
            .questions
            .iter()
            .zip(graded)
            .filter(|(_, g)| !g.correct)
            .map(|(q, _)| q)
            .collect();
        if missed.is_empty() {
            return Ok(Vec::new());
        }

        let mut user = format!("Node: {} ({})\nMissed questions:\n", node.name, node.label);
        for q in &missed {
            let answer = q.choices.get(q.answer_index).map(String::as_str).unwrap_or("");
            user.push_str(&format!("- {} (correct answer: {answer})\n", q.prompt));
        }

        let raw: WeakConceptsExtraction = self
            .structured(prompts::weak_concepts_system(), user)
            .await?;
        Ok(raw
            .concepts
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }

    pub async fn evaluate_capstone(
        &self,
        summary: Option<&ProjectSummary>,
        submission: &CapstoneSubmission,
        pass_score: f64,
    ) -> Result<CapstoneEvaluation> {
        let raw: CapstoneExtraction = self
            .structured(
                prompts::capstone_system(&capstone_rubric()),
                prompts::capstone_user(summary, submission),
            )
            .await?;
        Ok(CapstoneEvaluation::from_scores(
            raw.scores,
            raw.summary,
            pass_score,
        ))
    }

    fn window<'a>(&self, history: &'a [ChatMessage]) -> &'a [ChatMessage] {
        let start = history.len().saturating_sub(self.history_window);
        &history[start..]
    }

    async fn structured<T: serde::de::DeserializeOwned>(
        &self,
        system: String,
        user: String,
    ) -> Result<T> {
        let request = CompletionRequest::new(system)
            .with_user(user)
            .json()
            .with_temperature(EXTRACTION_TEMPERATURE);
        let completion = self.provider.complete(request).await?;
        parse_json(&completion.content).map_err(|e| {
            tracing::warn!(
                provider = self.provider.name(),
                error = %e,
                "Model output did not match the expected shape"
            );
            e
        })
    }
}

/// Concept tags of the missed questions, used when weak-concept analysis fails.
pub fn missed_concepts(assessment: &Assessment, graded: &[GradedQuestion]) -> Vec<String> {
    let mut concepts: Vec<String> = Vec::new();
    for (question, grade) in assessment.questions.iter().zip(graded) {
        if grade.correct {
            continue;
        }
        if let Some(concept) = question.concept.as_deref().map(str::trim) {
            if !concept.is_empty() && !concepts.iter().any(|c| c == concept) {
                concepts.push(concept.to_string());
            }
        }
    }
    concepts
}
