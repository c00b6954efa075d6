//! Study order: a topological sort of the prerequisite edges.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use endstate_core::{NodeLabel, NodeStatus};

use crate::error::{PlanError, Result};
use crate::graph::LearningGraph;

/// One entry of a learning plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// 1-based position in the plan.
    pub step: usize,
    pub node_id: String,
    pub label: NodeLabel,
    pub name: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub remedial: bool,
    /// Direct prerequisite node IDs.
    pub prerequisites: Vec<String>,
    /// All direct prerequisites are mastered.
    pub unlocked: bool,
}

impl LearningGraph {
    /// Order every node so that prerequisites come first (Kahn's algorithm).
    ///
    /// Nodes with no constraint between them are ordered by label
    /// (concepts, skills, topics, then projects) and then by name, so the
    /// plan is stable across requests.
    pub fn learning_order(&self) -> Result<Vec<PlanStep>> {
        let n = self.nodes.len();
        let mut pending: Vec<usize> = self.requires.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<(u8, String, usize)> = (0..n)
            .filter(|&i| pending[i] == 0)
            .map(|i| self.tie_key(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(key) = ready.pop_first() {
            let index = key.2;
            order.push(index);
            for &next in &self.unlocks[index] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.insert(self.tie_key(next));
                }
            }
        }

        if order.len() < n {
            let mut nodes: Vec<String> = (0..n)
                .filter(|&i| pending[i] > 0)
                .map(|i| self.nodes[i].name.clone())
                .collect();
            nodes.sort();
            tracing::warn!(count = nodes.len(), "Prerequisite cycle in skill graph");
            return Err(PlanError::Cycle { nodes });
        }

        Ok(order
            .into_iter()
            .enumerate()
            .map(|(pos, i)| {
                let node = &self.nodes[i];
                PlanStep {
                    step: pos + 1,
                    node_id: node.id.clone(),
                    label: node.label,
                    name: node.name.clone(),
                    status: node.status,
                    remedial: node.remedial,
                    prerequisites: self.requires[i]
                        .iter()
                        .map(|&p| self.nodes[p].id.clone())
                        .collect(),
                    unlocked: self.is_unlocked(i),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::sample;
    use endstate_core::{RelType, SessionId, SkillEdge, SkillNode};

    #[test]
    fn prerequisites_come_first() {
        let graph = LearningGraph::from_skill_graph(&sample());
        let plan = graph.learning_order().unwrap();

        let names: Vec<&str> = plan.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Futures", "HTTP", "Async", "Routing", "Web service"]);
        assert_eq!(plan[0].step, 1);
        assert!(plan[0].unlocked);
        assert!(!plan[4].unlocked);
        assert_eq!(plan[3].prerequisites.len(), 2);
    }

    #[test]
    fn every_edge_respects_the_order() {
        let sg = sample();
        let plan = LearningGraph::from_skill_graph(&sg).learning_order().unwrap();
        let position = |id: &str| plan.iter().position(|s| s.node_id == id).unwrap();

        for edge in sg.edges.iter().filter(|e| e.rel_type.is_prerequisite()) {
            assert!(position(&edge.target_id) < position(&edge.source_id));
        }
    }

    #[test]
    fn cycle_is_reported() {
        let s = SessionId::parse("cyclic").unwrap();
        let a = SkillNode::new(&s, NodeLabel::Concept, "Ownership", "");
        let b = SkillNode::new(&s, NodeLabel::Concept, "Borrowing", "");
        let c = SkillNode::new(&s, NodeLabel::Concept, "Standalone", "");
        let graph = endstate_core::SkillGraph {
            edges: vec![
                SkillEdge::new(&s, &a.id, &b.id, RelType::DependsOn),
                SkillEdge::new(&s, &b.id, &a.id, RelType::DependsOn),
            ],
            nodes: vec![a, b, c],
        };

        let err = LearningGraph::from_skill_graph(&graph)
            .learning_order()
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::Cycle {
                nodes: vec!["Borrowing".to_string(), "Ownership".to_string()]
            }
        );
    }

    #[test]
    fn empty_graph_has_empty_plan() {
        let graph = LearningGraph::from_skill_graph(&Default::default());
        assert!(graph.learning_order().unwrap().is_empty());
    }

    #[test]
    fn plan_step_serializes_labels() {
        let plan = LearningGraph::from_skill_graph(&sample())
            .learning_order()
            .unwrap();
        let json = serde_json::to_value(&plan[0]).unwrap();
        assert_eq!(json["label"], "Concept");
        assert_eq!(json["status"], "available");
    }
}
