//! endstate-core: Shared types, events, configuration, and error handling for Endstate.
//!
//! This crate provides the foundational types used across all Endstate components:
//! - Chat messages and sessions
//! - Project summaries and suggestions extracted from a conversation
//! - Skill graph nodes (Project, Topic, Skill, Concept) and relationship types
//! - Lessons, assessments, and capstone evaluation types
//! - SSE chat events shared by the server and the client
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod learning;
pub mod types;

pub use error::EndstateError;
pub use events::ChatEvent;
pub use types::{
    ChatMessage, GraphStats, NodeLabel, NodeStatus, ProjectSummary, RelType, Role, SessionId,
    SkillEdge, SkillGraph, SkillNode,
};
