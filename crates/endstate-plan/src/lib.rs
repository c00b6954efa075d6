//! endstate-plan: learning plans over a session's skill graph.
//!
//! Builds a compact in-memory view of a stored `SkillGraph`, orders it so
//! prerequisites come first, answers "what can I study next", and builds the
//! remedial nodes inserted after a failed assessment.

pub mod error;
pub mod graph;
pub mod order;
pub mod remedial;

pub use error::{PlanError, Result};
pub use graph::LearningGraph;
pub use order::PlanStep;
