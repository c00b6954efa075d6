//! Read operations for the skill graph.

use std::collections::HashMap;

use neo4rs::query;

use endstate_core::types::ProjectSummary;
use endstate_core::{GraphStats, NodeLabel, NodeStatus, SessionId, SkillEdge, SkillNode};

use crate::client::{GraphClient, GraphError};
use crate::store::ArtifactKind;

/// Columns every node-returning query projects, read by [`row_to_node`].
pub(crate) const NODE_COLUMNS: &str = "n.id AS id, labels(n) AS labels, \
     coalesce(n.name, '') AS name, coalesce(n.description, '') AS description, \
     coalesce(n.status, 'available') AS status, coalesce(n.mastery, -1.0) AS mastery, \
     coalesce(n.remedial, false) AS remedial";

/// `(v:Project OR v:Topic OR ...)` restricting a match to skill graph labels.
pub(crate) fn label_predicate(var: &str) -> String {
    let parts: Vec<String> = NodeLabel::ALL
        .iter()
        .map(|l| format!("{var}:{}", l.as_str()))
        .collect();
    format!("({})", parts.join(" OR "))
}

impl GraphClient {
    // ── Node Lookups ─────────────────────────────────────────────

    pub async fn find_node(
        &self,
        session_id: &SessionId,
        node_id: &str,
    ) -> Result<Option<SkillNode>, GraphError> {
        let cypher = format!(
            "MATCH (n {{session_id: $session_id, id: $id}})
             WHERE {pred}
             RETURN {NODE_COLUMNS}",
            pred = label_predicate("n"),
        );

        let q = query(&cypher)
            .param("session_id", session_id.as_str())
            .param("id", node_id);

        match self.query_one(q).await? {
            Some(row) => Ok(Some(row_to_node(&row, session_id)?)),
            None => Ok(None),
        }
    }

    /// Resolve the labels of existing nodes by id.
    pub async fn node_labels(
        &self,
        session_id: &SessionId,
        ids: &[String],
    ) -> Result<HashMap<String, NodeLabel>, GraphError> {
        let q = query(
            "MATCH (n {session_id: $session_id})
             WHERE n.id IN $ids
             RETURN n.id AS id, labels(n) AS labels",
        )
        .param("session_id", session_id.as_str())
        .param("ids", ids.to_vec());

        let rows = self.query_rows(q).await?;
        let mut labels = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id").unwrap_or_default();
            let raw: Vec<String> = row.get("labels").unwrap_or_default();
            if let Some(label) = skill_label(&raw) {
                labels.insert(id, label);
            }
        }
        Ok(labels)
    }

    // ── Session Graph ────────────────────────────────────────────

    pub async fn list_session_nodes(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<SkillNode>, GraphError> {
        let cypher = format!(
            "MATCH (n {{session_id: $session_id}})
             WHERE {pred}
             RETURN {NODE_COLUMNS}
             ORDER BY n.name",
            pred = label_predicate("n"),
        );

        let q = query(&cypher).param("session_id", session_id.as_str());

        let rows = self.query_rows(q).await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            nodes.push(row_to_node(&row, session_id)?);
        }
        Ok(nodes)
    }

    pub async fn list_session_edges(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<SkillEdge>, GraphError> {
        let cypher = format!(
            "MATCH (a {{session_id: $session_id}})-[r]->(b {{session_id: $session_id}})
             WHERE {a} AND {b}
             RETURN r.id AS id, type(r) AS rel_type, a.id AS source_id, b.id AS target_id
             ORDER BY r.id",
            a = label_predicate("a"),
            b = label_predicate("b"),
        );

        let q = query(&cypher).param("session_id", session_id.as_str());

        let rows = self.query_rows(q).await?;
        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            let Ok(rel_type) = rel_type.parse() else {
                tracing::warn!(rel_type = %rel_type, "Skipping relationship outside the schema");
                continue;
            };
            edges.push(SkillEdge {
                id: row.get("id").unwrap_or_default(),
                source_id: row.get("source_id").unwrap_or_default(),
                target_id: row.get("target_id").unwrap_or_default(),
                rel_type,
            });
        }
        Ok(edges)
    }

    /// Node and relationship counts for a session.
    pub async fn count_session_graph(
        &self,
        session_id: &SessionId,
    ) -> Result<GraphStats, GraphError> {
        let node_cypher = format!(
            "MATCH (n {{session_id: $session_id}})
             WHERE {pred}
             RETURN head(labels(n)) AS label,
                    count(n) AS cnt,
                    sum(CASE WHEN n.status = 'mastered' THEN 1 ELSE 0 END) AS mastered,
                    sum(CASE WHEN coalesce(n.remedial, false) THEN 1 ELSE 0 END) AS remedial",
            pred = label_predicate("n"),
        );
        let edge_cypher = format!(
            "MATCH (a {{session_id: $session_id}})-[r]->(b {{session_id: $session_id}})
             WHERE {a} AND {b}
             RETURN type(r) AS rel_type, count(r) AS cnt",
            a = label_predicate("a"),
            b = label_predicate("b"),
        );

        let mut stats = GraphStats::default();

        let rows = self
            .query_rows(query(&node_cypher).param("session_id", session_id.as_str()))
            .await?;
        for row in rows {
            let label: String = row.get("label").unwrap_or_default();
            let cnt = row.get::<i64>("cnt").unwrap_or(0).max(0) as u64;
            stats.node_count += cnt;
            stats.mastered_count += row.get::<i64>("mastered").unwrap_or(0).max(0) as u64;
            stats.remedial_count += row.get::<i64>("remedial").unwrap_or(0).max(0) as u64;
            *stats.nodes_by_label.entry(label).or_default() += cnt;
        }

        let rows = self
            .query_rows(query(&edge_cypher).param("session_id", session_id.as_str()))
            .await?;
        for row in rows {
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            let cnt = row.get::<i64>("cnt").unwrap_or(0).max(0) as u64;
            stats.edge_count += cnt;
            *stats.edges_by_type.entry(rel_type).or_default() += cnt;
        }

        Ok(stats)
    }

    // ── Artifacts ────────────────────────────────────────────────

    pub async fn get_artifact(
        &self,
        session_id: &SessionId,
        node_id: &str,
        kind: ArtifactKind,
    ) -> Result<Option<String>, GraphError> {
        let cypher = format!(
            "MATCH (n {{session_id: $session_id, id: $id}})
             RETURN coalesce(n.{prop}, '') AS payload",
            prop = kind.property(),
        );

        let q = query(&cypher)
            .param("session_id", session_id.as_str())
            .param("id", node_id);

        match self.query_one(q).await? {
            Some(row) => {
                let payload: String = row.get("payload").unwrap_or_default();
                Ok((!payload.is_empty()).then_some(payload))
            }
            None => Err(crate::store::not_found(session_id, node_id)),
        }
    }

    // ── Summaries ────────────────────────────────────────────────

    pub async fn find_summary(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ProjectSummary>, GraphError> {
        let q = query(
            "MATCH (s:Summary {session_id: $session_id})
             RETURN s.payload AS payload",
        )
        .param("session_id", session_id.as_str());

        match self.query_one(q).await? {
            Some(row) => {
                let payload: String = row.get("payload").map_err(|e| {
                    GraphError::Serialization(format!("Failed to read summary payload: {e}"))
                })?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }
}

/// Convert a row projected with [`NODE_COLUMNS`] into a `SkillNode`.
pub(crate) fn row_to_node(row: &neo4rs::Row, session_id: &SessionId) -> Result<SkillNode, GraphError> {
    let id: String = row
        .get("id")
        .map_err(|e| GraphError::Serialization(format!("Failed to read node id: {e}")))?;
    let labels: Vec<String> = row.get("labels").unwrap_or_default();
    let label = skill_label(&labels)
        .ok_or_else(|| GraphError::Serialization(format!("Node {id} has no skill graph label")))?;
    let status: String = row.get("status").unwrap_or_default();
    let mastery: f64 = row.get("mastery").unwrap_or(-1.0);

    Ok(SkillNode {
        id,
        session_id: session_id.clone(),
        label,
        name: row.get("name").unwrap_or_default(),
        description: row.get("description").unwrap_or_default(),
        status: status.parse().unwrap_or(NodeStatus::Available),
        mastery: (mastery >= 0.0).then_some(mastery),
        remedial: row.get("remedial").unwrap_or(false),
    })
}

/// First Neo4j label that belongs to the skill graph schema.
fn skill_label(labels: &[String]) -> Option<NodeLabel> {
    labels.iter().find_map(|l| l.parse().ok())
}
