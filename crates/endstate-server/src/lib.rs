//! endstate-server: the REST and SSE API over the tutor and the skill graph.
//!
//! Chat sessions live in memory ([`session`]); summaries, skill graphs, and
//! generated lessons and assessments go through a [`endstate_graph::GraphStore`].
//! Slow LLM work runs on the [`jobs::JobRunner`].

pub mod api;
pub mod jobs;
pub mod session;
pub mod state;

pub use api::{router, ApiError};
pub use state::AppState;
