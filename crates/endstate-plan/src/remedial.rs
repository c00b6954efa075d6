//! Remedial nodes inserted after a failed assessment.

use std::collections::HashSet;

use endstate_core::types::normalize_name;
use endstate_core::{NodeLabel, RelType, SessionId, SkillEdge, SkillGraph, SkillNode};

use crate::error::Result;
use crate::graph::LearningGraph;

/// Label of the remedial nodes and the relationship from the failed node to
/// them, chosen so the triple is allowed by the graph schema.
pub fn remedial_link(failed: NodeLabel) -> (NodeLabel, RelType) {
    match failed {
        NodeLabel::Concept => (NodeLabel::Concept, RelType::DependsOn),
        NodeLabel::Skill => (NodeLabel::Concept, RelType::Uses),
        NodeLabel::Topic => (NodeLabel::Concept, RelType::Includes),
        NodeLabel::Project => (NodeLabel::Skill, RelType::Requires),
    }
}

impl LearningGraph {
    /// Build the nodes and edges to merge after `node_id` failed its assessment.
    ///
    /// One remedial node per distinct weak concept, each a prerequisite of the
    /// failed node. Concepts that would close a prerequisite cycle (the node
    /// itself, or anything that already depends on it) are skipped.
    pub fn remedial_for(
        &self,
        session_id: &SessionId,
        node_id: &str,
        weak_concepts: &[String],
    ) -> Result<SkillGraph> {
        let failed = self.node(node_id)?;
        let (label, rel_type) = remedial_link(failed.label);
        let downstream: HashSet<&str> = self
            .dependents(node_id)?
            .into_iter()
            .map(|n| n.id.as_str())
            .collect();

        let mut seen = HashSet::new();
        let mut graph = SkillGraph::default();
        for concept in weak_concepts {
            let name = concept.trim();
            if name.is_empty() || !seen.insert(normalize_name(name)) {
                continue;
            }
            let id = SkillNode::id_for(session_id, label, name);
            if id == failed.id || downstream.contains(id.as_str()) {
                tracing::debug!(node_id, concept = name, "Skipping remedial node that would form a cycle");
                continue;
            }
            // A concept already in the graph is linked as it is, never
            // re-created, so its description and progress survive.
            let node = match self.node(&id) {
                Ok(existing) => existing.clone(),
                Err(_) => {
                    let mut node = SkillNode::new(
                        session_id,
                        label,
                        name,
                        &format!("Review of {name} for {}", failed.name),
                    );
                    node.remedial = true;
                    node
                }
            };
            graph
                .edges
                .push(SkillEdge::new(session_id, &failed.id, &node.id, rel_type));
            graph.nodes.push(node);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::sample;
    use endstate_core::NodeStatus;

    fn session() -> SessionId {
        SessionId::parse("plan-test").unwrap()
    }

    #[test]
    fn remedial_links_follow_schema() {
        for label in NodeLabel::ALL {
            let (target, rel) = remedial_link(label);
            assert!(rel.allows(label, target), "{label} -[{rel}]-> {target}");
            assert!(rel.is_prerequisite());
        }
    }

    #[test]
    fn remedial_nodes_become_prerequisites() {
        let sg = sample();
        let graph = LearningGraph::from_skill_graph(&sg);
        let routing = &sg.nodes[1];

        let weak = vec![
            "Path parameters".to_string(),
            "  path   PARAMETERS ".to_string(),
            "".to_string(),
            "Status codes".to_string(),
        ];
        let remedial = graph.remedial_for(&session(), &routing.id, &weak).unwrap();

        assert_eq!(remedial.nodes.len(), 2);
        assert!(remedial.nodes.iter().all(|n| n.remedial));
        assert!(remedial.nodes.iter().all(|n| n.label == NodeLabel::Concept));
        assert!(remedial
            .edges
            .iter()
            .all(|e| e.source_id == routing.id && e.rel_type == RelType::Uses));

        // Merged into the graph, the remedial concepts precede the failed skill.
        let mut merged = sg.clone();
        merged.nodes.extend(remedial.nodes.clone());
        merged.edges.extend(remedial.edges.clone());
        let plan = LearningGraph::from_skill_graph(&merged).learning_order().unwrap();
        let pos = |id: &str| plan.iter().position(|s| s.node_id == id).unwrap();
        for node in &remedial.nodes {
            assert!(pos(&node.id) < pos(&routing.id));
        }
    }

    #[test]
    fn remedial_skips_cycle_forming_concepts() {
        let sg = sample();
        let graph = LearningGraph::from_skill_graph(&sg);
        // A failed node is never its own remedial prerequisite.
        let futures = &sg.nodes[4];
        let remedial = graph
            .remedial_for(&session(), &futures.id, &["Futures".to_string()])
            .unwrap();
        assert!(remedial.nodes.is_empty());
        assert!(remedial.edges.is_empty());
    }

    #[test]
    fn existing_concept_is_linked_unchanged() {
        let mut sg = sample();
        sg.nodes[3].description = "Requests, responses and status codes".to_string();
        sg.nodes[3].status = NodeStatus::Mastered;
        sg.nodes[3].mastery = Some(0.9);
        let graph = LearningGraph::from_skill_graph(&sg);
        let routing = &sg.nodes[1];
        let http = &sg.nodes[3];

        let weak = vec!["http".to_string(), "Path parameters".to_string()];
        let remedial = graph.remedial_for(&session(), &routing.id, &weak).unwrap();

        assert_eq!(remedial.nodes.len(), 2);
        let linked = remedial.nodes.iter().find(|n| n.id == http.id).unwrap();
        assert_eq!(linked, http);
        assert!(!linked.remedial);

        let fresh = remedial.nodes.iter().find(|n| n.id != http.id).unwrap();
        assert!(fresh.remedial);
        assert_eq!(fresh.status, NodeStatus::default());
        assert!(remedial
            .edges
            .iter()
            .any(|e| e.source_id == routing.id && e.target_id == http.id));
    }
}
