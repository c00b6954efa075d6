//! In-process `GraphStore` with the same semantics as the Neo4j store.
//!
//! Backs `graph.backend = "memory"` and the test suites of the crates above.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use endstate_core::types::ProjectSummary;
use endstate_core::{GraphStats, NodeLabel, NodeStatus, SessionId, SkillGraph, SkillNode};

use crate::client::GraphError;
use crate::store::{not_found, validate_edges, ArtifactKind, GraphStore};

#[derive(Default)]
struct SessionGraph {
    nodes: BTreeMap<String, SkillNode>,
    edges: BTreeMap<String, endstate_core::SkillEdge>,
    artifacts: HashMap<(String, ArtifactKind), String>,
}

#[derive(Default)]
pub struct MemoryGraphStore {
    graphs: RwLock<HashMap<SessionId, SessionGraph>>,
    summaries: RwLock<HashMap<SessionId, ProjectSummary>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn merge_graph(
        &self,
        session_id: &SessionId,
        graph: &SkillGraph,
    ) -> Result<(), GraphError> {
        let mut graphs = self.graphs.write().await;
        let session = graphs.entry(session_id.clone()).or_default();

        let existing: HashMap<String, NodeLabel> = session
            .nodes
            .values()
            .map(|n| (n.id.clone(), n.label))
            .collect();
        validate_edges(graph, &existing)?;

        for node in &graph.nodes {
            match session.nodes.get_mut(&node.id) {
                Some(current) => {
                    current.name = node.name.clone();
                    current.description = node.description.clone();
                    current.remedial |= node.remedial;
                }
                None => {
                    let mut node = node.clone();
                    node.session_id = session_id.clone();
                    session.nodes.insert(node.id.clone(), node);
                }
            }
        }
        for edge in &graph.edges {
            session
                .edges
                .entry(edge.id.clone())
                .or_insert_with(|| edge.clone());
        }
        Ok(())
    }

    async fn session_graph(&self, session_id: &SessionId) -> Result<SkillGraph, GraphError> {
        let graphs = self.graphs.read().await;
        let Some(session) = graphs.get(session_id) else {
            return Ok(SkillGraph::default());
        };
        let mut nodes: Vec<SkillNode> = session.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(SkillGraph {
            nodes,
            edges: session.edges.values().cloned().collect(),
        })
    }

    async fn graph_stats(&self, session_id: &SessionId) -> Result<GraphStats, GraphError> {
        let graph = self.session_graph(session_id).await?;
        Ok(GraphStats::from_graph(&graph))
    }

    async fn get_node(
        &self,
        session_id: &SessionId,
        node_id: &str,
    ) -> Result<SkillNode, GraphError> {
        let graphs = self.graphs.read().await;
        graphs
            .get(session_id)
            .and_then(|s| s.nodes.get(node_id))
            .cloned()
            .ok_or_else(|| not_found(session_id, node_id))
    }

    async fn update_progress(
        &self,
        session_id: &SessionId,
        node_id: &str,
        status: NodeStatus,
        mastery: Option<f64>,
    ) -> Result<SkillNode, GraphError> {
        let mut graphs = self.graphs.write().await;
        let node = graphs
            .get_mut(session_id)
            .and_then(|s| s.nodes.get_mut(node_id))
            .ok_or_else(|| not_found(session_id, node_id))?;
        node.status = status;
        if mastery.is_some() {
            node.mastery = mastery;
        }
        Ok(node.clone())
    }

    async fn save_artifact(
        &self,
        session_id: &SessionId,
        node_id: &str,
        kind: ArtifactKind,
        json: &str,
    ) -> Result<(), GraphError> {
        let mut graphs = self.graphs.write().await;
        let session = graphs
            .get_mut(session_id)
            .filter(|s| s.nodes.contains_key(node_id))
            .ok_or_else(|| not_found(session_id, node_id))?;
        session
            .artifacts
            .insert((node_id.to_string(), kind), json.to_string());
        Ok(())
    }

    async fn load_artifact(
        &self,
        session_id: &SessionId,
        node_id: &str,
        kind: ArtifactKind,
    ) -> Result<Option<String>, GraphError> {
        let graphs = self.graphs.read().await;
        let session = graphs
            .get(session_id)
            .filter(|s| s.nodes.contains_key(node_id))
            .ok_or_else(|| not_found(session_id, node_id))?;
        Ok(session.artifacts.get(&(node_id.to_string(), kind)).cloned())
    }

    async fn delete_session_graph(&self, session_id: &SessionId) -> Result<u64, GraphError> {
        let removed = self.graphs.write().await.remove(session_id);
        Ok(removed.map(|s| s.nodes.len() as u64).unwrap_or(0))
    }

    async fn save_summary(&self, summary: &ProjectSummary) -> Result<(), GraphError> {
        self.summaries
            .write()
            .await
            .insert(summary.session_id.clone(), summary.clone());
        Ok(())
    }

    async fn load_summary(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ProjectSummary>, GraphError> {
        Ok(self.summaries.read().await.get(session_id).cloned())
    }

    async fn delete_summary(&self, session_id: &SessionId) -> Result<bool, GraphError> {
        Ok(self.summaries.write().await.remove(session_id).is_some())
    }
}
