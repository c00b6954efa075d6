//! Structured-output handling.
//!
//! Models wrap JSON in Markdown fences or surround it with prose more often
//! than not, so parsing first isolates the outermost JSON value and only
//! then deserializes it into one of the DTOs below.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use endstate_core::learning::{CriterionScore, LessonSection};
use endstate_core::types::{normalize_name, AgreedProject, ProjectSuggestion, UserProfile};
use endstate_core::{NodeLabel, RelType, SessionId, SkillEdge, SkillGraph, SkillNode};

use crate::error::{LlmError, Result};

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line. A fence on a
    // single line keeps it; `json_slice` skips past it anyway.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// The first complete top-level JSON object or array in `text`.
pub fn json_slice(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deserialize the JSON value embedded in a model response.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let body = strip_code_fences(text);
    let slice = json_slice(body)
        .ok_or_else(|| LlmError::Parse("no JSON value in model output".to_string()))?;
    Ok(serde_json::from_str(slice)?)
}

// ── DTOs ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct SummaryExtraction {
    #[serde(default)]
    pub user_profile: UserProfile,
    #[serde(default)]
    pub agreed_project: Option<AgreedProject>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsExtraction {
    #[serde(default)]
    pub projects: Vec<ProjectSuggestion>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractedNode {
    pub label: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", alias = "rel_type")]
    pub rel_type: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct GraphExtraction {
    #[serde(default)]
    pub nodes: Vec<ExtractedNode>,
    #[serde(default, alias = "edges")]
    pub relationships: Vec<ExtractedRelationship>,
}

#[derive(Debug, Deserialize)]
pub struct LessonExtraction {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub sections: Vec<LessonSection>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractedQuestion {
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<String>,
    pub answer_index: usize,
    #[serde(default)]
    pub concept: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssessmentExtraction {
    #[serde(default)]
    pub questions: Vec<ExtractedQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct WeakConceptsExtraction {
    #[serde(default)]
    pub concepts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CapstoneExtraction {
    #[serde(default)]
    pub scores: Vec<CriterionScore>,
    #[serde(default)]
    pub summary: String,
}

// ── Graph Conversion ─────────────────────────────────────────────

/// Convert an extracted graph into schema-conforming nodes and edges.
///
/// Nodes with unknown labels or empty names are dropped and duplicates
/// (same label and normalized name) collapse into one. Relationships are
/// resolved by node name; those with an unknown type, an unresolved
/// endpoint, or a triple the schema forbids are dropped.
pub fn graph_from_extraction(session_id: &SessionId, extraction: GraphExtraction) -> SkillGraph {
    let mut graph = SkillGraph::default();
    // One name may label several nodes (a Topic and a Skill both called "Async").
    let mut by_name: HashMap<String, Vec<(String, NodeLabel)>> = HashMap::new();
    let mut seen_nodes = HashSet::new();

    for raw in extraction.nodes {
        let Ok(label) = raw.label.parse::<NodeLabel>() else {
            tracing::warn!(label = %raw.label, name = %raw.name, "Dropping node with unknown label");
            continue;
        };
        if raw.name.trim().is_empty() {
            tracing::warn!(label = %label, "Dropping node with empty name");
            continue;
        }
        let node = SkillNode::new(session_id, label, &raw.name, &raw.description);
        if !seen_nodes.insert(node.id.clone()) {
            continue;
        }
        by_name
            .entry(normalize_name(&raw.name))
            .or_default()
            .push((node.id.clone(), label));
        graph.nodes.push(node);
    }

    let mut seen_edges = HashSet::new();
    for raw in extraction.relationships {
        let Ok(rel_type) = raw.rel_type.parse::<RelType>() else {
            tracing::warn!(rel_type = %raw.rel_type, "Dropping relationship with unknown type");
            continue;
        };
        let (Some(sources), Some(targets)) = (
            by_name.get(&normalize_name(&raw.source)),
            by_name.get(&normalize_name(&raw.target)),
        ) else {
            tracing::warn!(
                source = %raw.source,
                target = %raw.target,
                "Dropping relationship with unknown endpoint"
            );
            continue;
        };
        let endpoints = sources.iter().find_map(|(source_id, source)| {
            targets
                .iter()
                .find(|(target_id, target)| {
                    source_id != target_id && rel_type.allows(*source, *target)
                })
                .map(|(target_id, _)| (source_id, target_id))
        });
        let Some((source_id, target_id)) = endpoints else {
            tracing::warn!(
                source = %raw.source,
                target = %raw.target,
                rel_type = %rel_type,
                "Dropping relationship outside the schema"
            );
            continue;
        };
        let edge = SkillEdge::new(session_id, source_id, target_id, rel_type);
        if seen_edges.insert(edge.id.clone()) {
            graph.edges.push(edge);
        }
    }

    tracing::debug!(
        session_id = %session_id,
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "Converted extracted graph"
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_info_string() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn parses_single_line_fence() {
        let ok: WeakConceptsExtraction =
            parse_json("```json {\"concepts\": [\"Lifetimes\"]}```").unwrap();
        assert_eq!(ok.concepts, vec!["Lifetimes"]);
    }

    #[test]
    fn finds_json_inside_prose() {
        let text = r#"Sure! Here it is: {"msg": "a } in a string", "n": [1, 2]} Hope that helps."#;
        assert_eq!(
            json_slice(text),
            Some(r#"{"msg": "a } in a string", "n": [1, 2]}"#)
        );
        assert_eq!(json_slice("no json here"), None);
        assert_eq!(json_slice("{\"unterminated\": "), None);
    }

    #[test]
    fn parse_reports_missing_json() {
        let err = parse_json::<WeakConceptsExtraction>("I can't help with that").unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));

        let ok: WeakConceptsExtraction =
            parse_json("```\n{\"concepts\": [\"Traits\"]}\n```").unwrap();
        assert_eq!(ok.concepts, vec!["Traits"]);
    }

    #[test]
    fn graph_conversion_enforces_schema() {
        let session = SessionId::parse("extract").unwrap();
        let extraction: GraphExtraction = parse_json(
            r#"{
              "nodes": [
                {"label": "Project", "name": "CLI todo app"},
                {"label": "skill", "name": "Argument parsing"},
                {"label": "Concept", "name": "Enums"},
                {"label": "Concept", "name": "enums"},
                {"label": "Person", "name": "Ada"},
                {"label": "Concept", "name": "  "}
              ],
              "relationships": [
                {"source": "CLI todo app", "target": "Argument parsing", "type": "REQUIRES"},
                {"source": "Argument parsing", "target": "Enums", "type": "uses"},
                {"source": "argument parsing", "target": "ENUMS", "type": "USES"},
                {"source": "Enums", "target": "Argument parsing", "type": "USES"},
                {"source": "Enums", "target": "Ada", "type": "RELATED_TO"},
                {"source": "Enums", "target": "Enums", "type": "DEPENDS_ON"},
                {"source": "Enums", "target": "Argument parsing", "type": "TEACHES"}
              ]
            }"#,
        )
        .unwrap();

        let graph = graph_from_extraction(&session, extraction);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        assert!(graph
            .edges
            .iter()
            .all(|e| graph.node(&e.source_id).is_some() && graph.node(&e.target_id).is_some()));
    }

    #[test]
    fn shared_names_resolve_to_the_legal_pair() {
        let session = SessionId::parse("extract").unwrap();
        let extraction: GraphExtraction = parse_json(
            r#"{
              "nodes": [
                {"label": "Topic", "name": "Async"},
                {"label": "Skill", "name": "Async"},
                {"label": "Concept", "name": "Futures"}
              ],
              "relationships": [
                {"source": "Async", "target": "Futures", "type": "USES"},
                {"source": "Async", "target": "Async", "type": "INCLUDES"},
                {"source": "Futures", "target": "Async", "type": "REQUIRES"}
              ]
            }"#,
        )
        .unwrap();

        let graph = graph_from_extraction(&session, extraction);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);

        let skill = SkillNode::id_for(&session, NodeLabel::Skill, "Async");
        let topic = SkillNode::id_for(&session, NodeLabel::Topic, "Async");
        let futures = SkillNode::id_for(&session, NodeLabel::Concept, "Futures");
        assert!(graph
            .edges
            .iter()
            .any(|e| e.rel_type == RelType::Uses && e.source_id == skill && e.target_id == futures));
        assert!(graph.edges.iter().any(|e| {
            e.rel_type == RelType::Includes && e.source_id == topic && e.target_id == skill
        }));
    }
}
