//! Error types for the endstate-plan crate.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// The prerequisite edges contain a cycle. `nodes` names every node
    /// that could not be ordered.
    #[error("Prerequisite cycle among: {}", nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },
}

pub type Result<T> = std::result::Result<T, PlanError>;
