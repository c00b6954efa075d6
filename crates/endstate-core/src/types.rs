//! Core domain types for Endstate.
//!
//! These types cover the chat conversation, the project summary extracted
//! from it, and the skill graph (nodes and relationships) persisted in Neo4j.
//! They double as the JSON shapes served by the API.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EndstateError;

/// Namespace UUID for deterministic node and edge IDs.
const ENDSTATE_NS: Uuid = Uuid::from_bytes([
    0x3f, 0x1c, 0x6e, 0x52, 0x8a, 0x4d, 0x4b, 0x0e, 0x9c, 0x27, 0x51, 0xd8, 0xe0, 0x6a, 0x19, 0xb4,
]);

const MAX_SESSION_ID_LEN: usize = 128;

// ── Session ───────────────────────────────────────────────────────

/// Client-generated identifier partitioning chat and graph state per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a raw session id.
    ///
    /// Accepts 1..=128 characters of `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, EndstateError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_SESSION_ID_LEN {
            return Err(EndstateError::InvalidSession(format!(
                "length must be 1..={MAX_SESSION_ID_LEN}"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(EndstateError::InvalidSession(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = EndstateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ── Chat ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A single chat message in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// The `X-Request-ID` of the turn that produced this message.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>, request_id: Option<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            request_id,
        }
    }

    pub fn user(content: impl Into<String>, request_id: Option<String>) -> Self {
        Self::new(Role::User, content, request_id)
    }

    pub fn assistant(content: impl Into<String>, request_id: Option<String>) -> Self {
        Self::new(Role::Assistant, content, request_id)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, None)
    }
}

// ── Project Summary ───────────────────────────────────────────────

/// What the tutor has learned about the learner.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub time_commitment: Option<String>,
}

/// The project the learner and tutor agreed on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgreedProject {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

/// Summary of a session's conversation, extracted by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSummary {
    pub session_id: SessionId,
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
    pub updated_at: DateTime<Utc>,
}

impl ProjectSummary {
    pub fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            user_profile: UserProfile::default(),
            agreed_project: None,
            topics: Vec::new(),
            skills: Vec::new(),
            concepts: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Partial update of a project summary. Absent fields are left unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectSummaryPatch {
    pub user_profile: Option<UserProfile>,
    pub agreed_project: Option<AgreedProject>,
    pub topics: Option<Vec<String>>,
    pub skills: Option<Vec<String>>,
    pub concepts: Option<Vec<String>>,
}

impl ProjectSummaryPatch {
    pub fn is_empty(&self) -> bool {
        self.user_profile.is_none()
            && self.agreed_project.is_none()
            && self.topics.is_none()
            && self.skills.is_none()
            && self.concepts.is_none()
    }

    /// Apply the patch in place and bump `updated_at`.
    pub fn apply(self, summary: &mut ProjectSummary) {
        if let Some(profile) = self.user_profile {
            summary.user_profile = profile;
        }
        if let Some(project) = self.agreed_project {
            summary.agreed_project = Some(project);
        }
        if let Some(topics) = self.topics {
            summary.topics = topics;
        }
        if let Some(skills) = self.skills {
            summary.skills = skills;
        }
        if let Some(concepts) = self.concepts {
            summary.concepts = concepts;
        }
        summary.updated_at = Utc::now();
    }
}

/// A candidate project proposed to the learner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSuggestion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

// ── Skill Graph ───────────────────────────────────────────────────

/// Allowed node labels in the skill graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeLabel {
    Project,
    Topic,
    Skill,
    Concept,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 4] = [
        NodeLabel::Project,
        NodeLabel::Topic,
        NodeLabel::Skill,
        NodeLabel::Concept,
    ];

    /// The Neo4j label.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Project => "Project",
            NodeLabel::Topic => "Topic",
            NodeLabel::Skill => "Skill",
            NodeLabel::Concept => "Concept",
        }
    }

    /// Study rank among independent nodes: foundations before aggregates.
    pub fn study_rank(&self) -> u8 {
        match self {
            NodeLabel::Concept => 0,
            NodeLabel::Skill => 1,
            NodeLabel::Topic => 2,
            NodeLabel::Project => 3,
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeLabel {
    type Err = EndstateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(NodeLabel::Project),
            "topic" => Ok(NodeLabel::Topic),
            "skill" => Ok(NodeLabel::Skill),
            "concept" => Ok(NodeLabel::Concept),
            other => Err(EndstateError::Validation(format!(
                "unknown node label: {other}"
            ))),
        }
    }
}

/// Allowed relationship types in the skill graph.
///
/// An edge `a -[R]-> b` reads "a needs b" for every type except `RelatedTo`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    Requires,
    Includes,
    DependsOn,
    Uses,
    RelatedTo,
}

impl RelType {
    pub const ALL: [RelType; 5] = [
        RelType::Requires,
        RelType::Includes,
        RelType::DependsOn,
        RelType::Uses,
        RelType::RelatedTo,
    ];

    /// The Cypher relationship type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::Requires => "REQUIRES",
            RelType::Includes => "INCLUDES",
            RelType::DependsOn => "DEPENDS_ON",
            RelType::Uses => "USES",
            RelType::RelatedTo => "RELATED_TO",
        }
    }

    /// Whether the edge imposes a study order (target before source).
    pub fn is_prerequisite(&self) -> bool {
        !matches!(self, RelType::RelatedTo)
    }

    /// Whether `source -[self]-> target` is permitted by the graph schema.
    pub fn allows(&self, source: NodeLabel, target: NodeLabel) -> bool {
        use NodeLabel::*;
        match self {
            RelType::Requires => source == Project && matches!(target, Topic | Skill),
            RelType::Includes => source == Topic && matches!(target, Skill | Concept),
            RelType::DependsOn => {
                matches!((source, target), (Skill, Skill) | (Concept, Concept))
            }
            RelType::Uses => source == Skill && target == Concept,
            RelType::RelatedTo => source != Project && target != Project,
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelType {
    type Err = EndstateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        RelType::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| EndstateError::Validation(format!("unknown relationship type: {s}")))
    }
}

/// Learning progress of a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Locked,
    #[default]
    Available,
    InProgress,
    Mastered,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Locked => "locked",
            NodeStatus::Available => "available",
            NodeStatus::InProgress => "in_progress",
            NodeStatus::Mastered => "mastered",
        }
    }
}

impl FromStr for NodeStatus {
    type Err = EndstateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "locked" => Ok(NodeStatus::Locked),
            "available" => Ok(NodeStatus::Available),
            "in_progress" => Ok(NodeStatus::InProgress),
            "mastered" => Ok(NodeStatus::Mastered),
            other => Err(EndstateError::Validation(format!("unknown status: {other}"))),
        }
    }
}

/// A node in a session's skill graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillNode {
    pub id: String,
    pub session_id: SessionId,
    pub label: NodeLabel,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub mastery: Option<f64>,
    #[serde(default)]
    pub remedial: bool,
}

impl SkillNode {
    pub fn new(
        session_id: &SessionId,
        label: NodeLabel,
        name: &str,
        description: &str,
    ) -> Self {
        Self {
            id: Self::id_for(session_id, label, name),
            session_id: session_id.clone(),
            label,
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            status: NodeStatus::default(),
            mastery: None,
            remedial: false,
        }
    }

    /// Deterministic node ID from session + label + normalized name so that
    /// re-extracting the same concept merges instead of duplicating.
    pub fn id_for(session_id: &SessionId, label: NodeLabel, name: &str) -> String {
        Uuid::new_v5(
            &ENDSTATE_NS,
            format!("{}:{}:{}", session_id, label.as_str(), normalize_name(name)).as_bytes(),
        )
        .to_string()
    }
}

/// A relationship between two skill graph nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub rel_type: RelType,
}

impl SkillEdge {
    pub fn new(session_id: &SessionId, source_id: &str, target_id: &str, rel_type: RelType) -> Self {
        let id = Uuid::new_v5(
            &ENDSTATE_NS,
            format!("{session_id}:edge:{}:{source_id}:{target_id}", rel_type.as_str()).as_bytes(),
        )
        .to_string();
        Self {
            id,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            rel_type,
        }
    }
}

/// A session's skill graph.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SkillGraph {
    pub nodes: Vec<SkillNode>,
    pub edges: Vec<SkillEdge>,
}

impl SkillGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&SkillNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Convert into the `{nodes, edges}` wire shape served to the graph view.
    pub fn to_view(&self) -> GraphView {
        GraphView {
            nodes: self.nodes.iter().map(GraphNodeView::from).collect(),
            edges: self.edges.iter().map(GraphEdgeView::from).collect(),
        }
    }
}

// ── Wire Shapes ───────────────────────────────────────────────────

/// Graph node as served to the visualization: `{id, labels, properties}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNodeView {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: serde_json::Value,
}

impl From<&SkillNode> for GraphNodeView {
    fn from(node: &SkillNode) -> Self {
        Self {
            id: node.id.clone(),
            labels: vec![node.label.as_str().to_string()],
            properties: serde_json::json!({
                "name": node.name,
                "description": node.description,
                "session_id": node.session_id,
                "status": node.status,
                "mastery": node.mastery,
                "remedial": node.remedial,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdgeView {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: serde_json::Value,
}

impl From<&SkillEdge> for GraphEdgeView {
    fn from(edge: &SkillEdge) -> Self {
        Self {
            id: edge.id.clone(),
            source: edge.source_id.clone(),
            target: edge.target_id.clone(),
            rel_type: edge.rel_type.as_str().to_string(),
            properties: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GraphView {
    pub nodes: Vec<GraphNodeView>,
    pub edges: Vec<GraphEdgeView>,
}

/// Aggregate counts for a session's skill graph.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GraphStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub nodes_by_label: BTreeMap<String, u64>,
    pub edges_by_type: BTreeMap<String, u64>,
    pub mastered_count: u64,
    pub remedial_count: u64,
}

impl GraphStats {
    pub fn from_graph(graph: &SkillGraph) -> Self {
        let mut stats = GraphStats {
            node_count: graph.nodes.len() as u64,
            edge_count: graph.edges.len() as u64,
            ..Default::default()
        };
        for node in &graph.nodes {
            *stats
                .nodes_by_label
                .entry(node.label.as_str().to_string())
                .or_default() += 1;
            if node.status == NodeStatus::Mastered {
                stats.mastered_count += 1;
            }
            if node.remedial {
                stats.remedial_count += 1;
            }
        }
        for edge in &graph.edges {
            *stats
                .edges_by_type
                .entry(edge.rel_type.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }
}

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
