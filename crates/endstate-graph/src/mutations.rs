//! Write operations for the skill graph.
//!
//! All node and edge writes use MERGE (upsert) semantics so re-extracting
//! a graph is idempotent. Nodes are identified by (session_id, id).

use chrono::Utc;
use neo4rs::query;

use endstate_core::types::ProjectSummary;
use endstate_core::{NodeStatus, SessionId, SkillEdge, SkillGraph, SkillNode};

use crate::client::{GraphClient, GraphError};
use crate::queries::{label_predicate, row_to_node, NODE_COLUMNS};
use crate::store::ArtifactKind;

impl GraphClient {
    // ── Graph Upserts ────────────────────────────────────────────

    /// Write all nodes then all edges of `graph` in one transaction.
    ///
    /// Callers validate the relationship schema first; see
    /// [`crate::store::validate_edges`].
    pub async fn write_graph(
        &self,
        session_id: &SessionId,
        graph: &SkillGraph,
    ) -> Result<(), GraphError> {
        let mut txn = self.start_txn().await?;
        let now = Utc::now().to_rfc3339();

        for node in &graph.nodes {
            txn.run(node_merge_query(session_id, node, &now)).await?;
        }
        for edge in &graph.edges {
            txn.run(edge_merge_query(session_id, edge, &now)).await?;
        }

        txn.commit().await?;
        tracing::debug!(
            session_id = %session_id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Merged skill graph"
        );
        Ok(())
    }

    // ── Progress ─────────────────────────────────────────────────

    /// Update status (and mastery if given). Returns `None` if the node is absent.
    pub async fn set_progress(
        &self,
        session_id: &SessionId,
        node_id: &str,
        status: NodeStatus,
        mastery: Option<f64>,
    ) -> Result<Option<SkillNode>, GraphError> {
        let set_mastery = if mastery.is_some() {
            ", n.mastery = $mastery"
        } else {
            ""
        };
        let cypher = format!(
            "MATCH (n {{session_id: $session_id, id: $id}})
             WHERE {pred}
             SET n.status = $status, n.updated_at = $now{set_mastery}
             RETURN {NODE_COLUMNS}",
            pred = label_predicate("n"),
        );

        let q = query(&cypher)
            .param("session_id", session_id.as_str())
            .param("id", node_id)
            .param("status", status.as_str())
            .param("mastery", mastery.unwrap_or(0.0))
            .param("now", Utc::now().to_rfc3339());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(row_to_node(&row, session_id)?)),
            None => Ok(None),
        }
    }

    // ── Artifacts ────────────────────────────────────────────────

    /// Store a serialized lesson/assessment on a node. Returns false if the node is absent.
    pub async fn set_artifact(
        &self,
        session_id: &SessionId,
        node_id: &str,
        kind: ArtifactKind,
        json: &str,
    ) -> Result<bool, GraphError> {
        let cypher = format!(
            "MATCH (n {{session_id: $session_id, id: $id}})
             SET n.{prop} = $payload, n.updated_at = $now
             RETURN n.id AS id",
            prop = kind.property(),
        );

        let q = query(&cypher)
            .param("session_id", session_id.as_str())
            .param("id", node_id)
            .param("payload", json)
            .param("now", Utc::now().to_rfc3339());

        Ok(self.query_one(q).await?.is_some())
    }

    // ── Deletion ─────────────────────────────────────────────────

    /// Detach-delete every skill graph node of a session.
    pub async fn remove_session_nodes(&self, session_id: &SessionId) -> Result<u64, GraphError> {
        let cypher = format!(
            "MATCH (n {{session_id: $session_id}})
             WHERE {pred}
             DETACH DELETE n
             RETURN count(n) AS cnt",
            pred = label_predicate("n"),
        );

        let q = query(&cypher).param("session_id", session_id.as_str());

        let deleted = match self.query_one(q).await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        tracing::info!(session_id = %session_id, deleted, "Deleted session graph");
        Ok(deleted.max(0) as u64)
    }

    // ── Summaries ────────────────────────────────────────────────

    pub async fn upsert_summary(&self, summary: &ProjectSummary) -> Result<(), GraphError> {
        let payload = serde_json::to_string(summary)?;
        let q = query(
            "MERGE (s:Summary {session_id: $session_id})
             SET s.payload = $payload, s.updated_at = $now",
        )
        .param("session_id", summary.session_id.as_str())
        .param("payload", payload)
        .param("now", summary.updated_at.to_rfc3339());

        self.run(q).await
    }

    pub async fn remove_summary(&self, session_id: &SessionId) -> Result<bool, GraphError> {
        let q = query(
            "MATCH (s:Summary {session_id: $session_id})
             DETACH DELETE s
             RETURN count(s) AS cnt",
        )
        .param("session_id", session_id.as_str());

        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0) > 0),
            None => Ok(false),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// MERGE a node. On match, progress fields are left alone and the
/// remedial flag is sticky.
fn node_merge_query(session_id: &SessionId, node: &SkillNode, now: &str) -> neo4rs::Query {
    let cypher = format!(
        "MERGE (n:{label} {{session_id: $session_id, id: $id}})
         ON CREATE SET
           n.name = $name, n.description = $description,
           n.status = $status, n.remedial = $remedial,
           n.created_at = $now, n.updated_at = $now
         ON MATCH SET
           n.name = $name, n.description = $description,
           n.remedial = coalesce(n.remedial, false) OR $remedial,
           n.updated_at = $now",
        label = node.label.as_str(),
    );

    query(&cypher)
        .param("session_id", session_id.as_str())
        .param("id", node.id.as_str())
        .param("name", node.name.as_str())
        .param("description", node.description.as_str())
        .param("status", node.status.as_str())
        .param("remedial", node.remedial)
        .param("now", now)
}

fn edge_merge_query(session_id: &SessionId, edge: &SkillEdge, now: &str) -> neo4rs::Query {
    let cypher = format!(
        "MATCH (a {{session_id: $session_id, id: $source_id}})
         MATCH (b {{session_id: $session_id, id: $target_id}})
         MERGE (a)-[r:{rel} {{id: $id}}]->(b)
         ON CREATE SET r.session_id = $session_id, r.created_at = $now",
        rel = edge.rel_type.as_str(),
    );

    query(&cypher)
        .param("session_id", session_id.as_str())
        .param("source_id", edge.source_id.as_str())
        .param("target_id", edge.target_id.as_str())
        .param("id", edge.id.as_str())
        .param("now", now)
}
