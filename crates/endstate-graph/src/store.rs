//! The `GraphStore` abstraction over skill graph persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use endstate_core::types::ProjectSummary;
use endstate_core::{GraphStats, NodeLabel, NodeStatus, SessionId, SkillGraph, SkillNode};

use crate::client::{GraphClient, GraphError};

/// Generated content cached on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Lesson,
    Assessment,
}

impl ArtifactKind {
    /// Node property holding the serialized artifact.
    pub fn property(&self) -> &'static str {
        match self {
            ArtifactKind::Lesson => "lesson_json",
            ArtifactKind::Assessment => "assessment_json",
        }
    }
}

/// Session-scoped skill graph persistence.
///
/// Every operation is partitioned by [`SessionId`]; nodes of one session are
/// never visible to another.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert nodes, then edges.
    ///
    /// Existing nodes keep their progress (`status`, `mastery`). Fails with
    /// [`GraphError::Schema`] without writing anything if an edge references
    /// an unknown node or violates the relationship schema.
    async fn merge_graph(&self, session_id: &SessionId, graph: &SkillGraph)
        -> Result<(), GraphError>;

    /// All nodes and edges of a session.
    async fn session_graph(&self, session_id: &SessionId) -> Result<SkillGraph, GraphError>;

    async fn graph_stats(&self, session_id: &SessionId) -> Result<GraphStats, GraphError>;

    async fn get_node(&self, session_id: &SessionId, node_id: &str)
        -> Result<SkillNode, GraphError>;

    /// Set a node's status and, when given, its mastery score.
    async fn update_progress(
        &self,
        session_id: &SessionId,
        node_id: &str,
        status: NodeStatus,
        mastery: Option<f64>,
    ) -> Result<SkillNode, GraphError>;

    async fn save_artifact(
        &self,
        session_id: &SessionId,
        node_id: &str,
        kind: ArtifactKind,
        json: &str,
    ) -> Result<(), GraphError>;

    async fn load_artifact(
        &self,
        session_id: &SessionId,
        node_id: &str,
        kind: ArtifactKind,
    ) -> Result<Option<String>, GraphError>;

    /// Delete every node (and attached edge) of a session. Returns the node count.
    async fn delete_session_graph(&self, session_id: &SessionId) -> Result<u64, GraphError>;

    async fn save_summary(&self, summary: &ProjectSummary) -> Result<(), GraphError>;

    async fn load_summary(&self, session_id: &SessionId)
        -> Result<Option<ProjectSummary>, GraphError>;

    /// Returns whether a summary existed.
    async fn delete_summary(&self, session_id: &SessionId) -> Result<bool, GraphError>;
}

/// Check every edge of `graph` against the relationship schema.
///
/// Endpoint labels are resolved from the graph's own nodes first, then from
/// `existing` (nodes already stored for the session).
pub fn validate_edges(
    graph: &SkillGraph,
    existing: &HashMap<String, NodeLabel>,
) -> Result<(), GraphError> {
    let labels: HashMap<&str, NodeLabel> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.label))
        .collect();
    let resolve = |id: &str| {
        labels
            .get(id)
            .copied()
            .or_else(|| existing.get(id).copied())
    };

    for edge in &graph.edges {
        let (Some(source), Some(target)) = (resolve(&edge.source_id), resolve(&edge.target_id))
        else {
            return Err(GraphError::Schema(format!(
                "edge {} references an unknown node",
                edge.id
            )));
        };
        if !edge.rel_type.allows(source, target) {
            return Err(GraphError::Schema(format!(
                "({source})-[:{}]->({target}) is not allowed",
                edge.rel_type
            )));
        }
    }
    Ok(())
}

/// Edge endpoints not present among the graph's own nodes.
pub fn foreign_endpoints(graph: &SkillGraph) -> Vec<String> {
    let mut ids: Vec<String> = graph
        .edges
        .iter()
        .flat_map(|e| [e.source_id.as_str(), e.target_id.as_str()])
        .filter(|id| graph.node(id).is_none())
        .map(String::from)
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn merge_graph(
        &self,
        session_id: &SessionId,
        graph: &SkillGraph,
    ) -> Result<(), GraphError> {
        let foreign = foreign_endpoints(graph);
        let existing = if foreign.is_empty() {
            HashMap::new()
        } else {
            self.node_labels(session_id, &foreign).await?
        };
        validate_edges(graph, &existing)?;
        self.write_graph(session_id, graph).await
    }

    async fn session_graph(&self, session_id: &SessionId) -> Result<SkillGraph, GraphError> {
        let nodes = self.list_session_nodes(session_id).await?;
        let edges = self.list_session_edges(session_id).await?;
        Ok(SkillGraph { nodes, edges })
    }

    async fn graph_stats(&self, session_id: &SessionId) -> Result<GraphStats, GraphError> {
        self.count_session_graph(session_id).await
    }

    async fn get_node(
        &self,
        session_id: &SessionId,
        node_id: &str,
    ) -> Result<SkillNode, GraphError> {
        self.find_node(session_id, node_id)
            .await?
            .ok_or_else(|| not_found(session_id, node_id))
    }

    async fn update_progress(
        &self,
        session_id: &SessionId,
        node_id: &str,
        status: NodeStatus,
        mastery: Option<f64>,
    ) -> Result<SkillNode, GraphError> {
        self.set_progress(session_id, node_id, status, mastery)
            .await?
            .ok_or_else(|| not_found(session_id, node_id))
    }

    async fn save_artifact(
        &self,
        session_id: &SessionId,
        node_id: &str,
        kind: ArtifactKind,
        json: &str,
    ) -> Result<(), GraphError> {
        if self.set_artifact(session_id, node_id, kind, json).await? {
            Ok(())
        } else {
            Err(not_found(session_id, node_id))
        }
    }

    async fn load_artifact(
        &self,
        session_id: &SessionId,
        node_id: &str,
        kind: ArtifactKind,
    ) -> Result<Option<String>, GraphError> {
        self.get_artifact(session_id, node_id, kind).await
    }

    async fn delete_session_graph(&self, session_id: &SessionId) -> Result<u64, GraphError> {
        self.remove_session_nodes(session_id).await
    }

    async fn save_summary(&self, summary: &ProjectSummary) -> Result<(), GraphError> {
        self.upsert_summary(summary).await
    }

    async fn load_summary(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ProjectSummary>, GraphError> {
        self.find_summary(session_id).await
    }

    async fn delete_summary(&self, session_id: &SessionId) -> Result<bool, GraphError> {
        self.remove_summary(session_id).await
    }
}

pub(crate) fn not_found(session_id: &SessionId, node_id: &str) -> GraphError {
    GraphError::NotFound {
        label: "Node".to_string(),
        id: node_id.to_string(),
        session_id: session_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endstate_core::{RelType, SkillEdge};

    fn sid() -> SessionId {
        SessionId::parse("s1").unwrap()
    }

    #[test]
    fn validate_accepts_schema_edges() {
        let sid = sid();
        let skill = SkillNode::new(&sid, NodeLabel::Skill, "HTTP routing", "");
        let concept = SkillNode::new(&sid, NodeLabel::Concept, "Path params", "");
        let edge = SkillEdge::new(&sid, &skill.id, &concept.id, RelType::Uses);
        let graph = SkillGraph {
            nodes: vec![skill, concept],
            edges: vec![edge],
        };
        assert!(validate_edges(&graph, &HashMap::new()).is_ok());
        assert!(foreign_endpoints(&graph).is_empty());
    }

    #[test]
    fn validate_rejects_disallowed_triple() {
        let sid = sid();
        let concept = SkillNode::new(&sid, NodeLabel::Concept, "Closures", "");
        let skill = SkillNode::new(&sid, NodeLabel::Skill, "Iterators", "");
        let edge = SkillEdge::new(&sid, &concept.id, &skill.id, RelType::Uses);
        let graph = SkillGraph {
            nodes: vec![concept, skill],
            edges: vec![edge],
        };
        assert!(matches!(
            validate_edges(&graph, &HashMap::new()),
            Err(GraphError::Schema(_))
        ));
    }

    #[test]
    fn validate_resolves_existing_endpoints() {
        let sid = sid();
        let remedial = SkillNode::new(&sid, NodeLabel::Concept, "Borrowing basics", "");
        let existing_id = SkillNode::id_for(&sid, NodeLabel::Concept, "Lifetimes");
        let edge = SkillEdge::new(&sid, &existing_id, &remedial.id, RelType::DependsOn);
        let graph = SkillGraph {
            nodes: vec![remedial],
            edges: vec![edge],
        };

        assert_eq!(foreign_endpoints(&graph), vec![existing_id.clone()]);
        assert!(validate_edges(&graph, &HashMap::new()).is_err());

        let existing = HashMap::from([(existing_id, NodeLabel::Concept)]);
        assert!(validate_edges(&graph, &existing).is_ok());
    }
}
