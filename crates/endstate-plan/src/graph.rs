//! In-memory learning graph.
//!
//! Converts a stored `SkillGraph` into a dense adjacency list of
//! prerequisite edges. For every prerequisite relationship `a -[R]-> b`,
//! `b` must be studied before `a`.

use std::collections::{HashMap, HashSet, VecDeque};

use endstate_core::{NodeStatus, SkillGraph, SkillNode};

use crate::error::{PlanError, Result};

pub struct LearningGraph {
    /// All nodes, indexed by dense index.
    pub nodes: Vec<SkillNode>,
    /// `requires[i]` = direct prerequisites of node `i` (sorted, deduplicated).
    pub requires: Vec<Vec<usize>>,
    /// `unlocks[i]` = nodes that list `i` as a direct prerequisite.
    pub unlocks: Vec<Vec<usize>>,
    /// Map from node ID to dense index.
    pub node_index: HashMap<String, usize>,
}

impl LearningGraph {
    /// Build from a session's skill graph.
    ///
    /// `RELATED_TO` edges, self-loops, and edges whose endpoints are not in
    /// the graph carry no ordering and are skipped.
    pub fn from_skill_graph(graph: &SkillGraph) -> Self {
        let nodes = graph.nodes.clone();
        let node_index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut requires = vec![Vec::new(); nodes.len()];
        let mut unlocks = vec![Vec::new(); nodes.len()];

        for edge in &graph.edges {
            if !edge.rel_type.is_prerequisite() {
                continue;
            }
            let (Some(&src), Some(&tgt)) = (
                node_index.get(&edge.source_id),
                node_index.get(&edge.target_id),
            ) else {
                tracing::debug!(edge_id = %edge.id, "Skipping edge with unknown endpoint");
                continue;
            };
            if src == tgt {
                continue;
            }
            requires[src].push(tgt);
            unlocks[tgt].push(src);
        }

        for list in requires.iter_mut().chain(unlocks.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            nodes,
            requires,
            unlocks,
            node_index,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.requires.iter().map(Vec::len).sum()
    }

    pub fn node(&self, node_id: &str) -> Result<&SkillNode> {
        self.index_of(node_id).map(|i| &self.nodes[i])
    }

    pub(crate) fn index_of(&self, node_id: &str) -> Result<usize> {
        self.node_index
            .get(node_id)
            .copied()
            .ok_or_else(|| PlanError::NodeNotFound {
                node_id: node_id.to_string(),
            })
    }

    /// Sort key among nodes with no ordering constraint between them.
    pub(crate) fn tie_key(&self, index: usize) -> (u8, String, usize) {
        let node = &self.nodes[index];
        (node.label.study_rank(), node.name.to_lowercase(), index)
    }

    /// Transitive prerequisites of a node, foundations first.
    pub fn prerequisites(&self, node_id: &str) -> Result<Vec<&SkillNode>> {
        let start = self.index_of(node_id)?;
        let reachable = self.closure(start, &self.requires);
        Ok(self.sorted_nodes(reachable))
    }

    /// Every node that transitively depends on `node_id`.
    pub fn dependents(&self, node_id: &str) -> Result<Vec<&SkillNode>> {
        let start = self.index_of(node_id)?;
        let reachable = self.closure(start, &self.unlocks);
        Ok(self.sorted_nodes(reachable))
    }

    /// A node is unlocked once all of its direct prerequisites are mastered.
    pub fn unlocked(&self, node_id: &str) -> Result<bool> {
        let index = self.index_of(node_id)?;
        Ok(self.is_unlocked(index))
    }

    /// Unlocked nodes that are not yet mastered, in study order.
    pub fn next_available(&self) -> Vec<&SkillNode> {
        let ready: HashSet<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].status != NodeStatus::Mastered && self.is_unlocked(i))
            .collect();
        self.sorted_nodes(ready)
    }

    pub(crate) fn is_unlocked(&self, index: usize) -> bool {
        self.requires[index]
            .iter()
            .all(|&p| self.nodes[p].status == NodeStatus::Mastered)
    }

    /// BFS over `adjacency` from `start`, excluding `start` itself.
    fn closure(&self, start: usize, adjacency: &[Vec<usize>]) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for &next in &adjacency[current] {
                if next != start && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    fn sorted_nodes(&self, indices: HashSet<usize>) -> Vec<&SkillNode> {
        let mut indices: Vec<usize> = indices.into_iter().collect();
        indices.sort_by_key(|&i| self.tie_key(i));
        indices.into_iter().map(|i| &self.nodes[i]).collect()
    }
}
