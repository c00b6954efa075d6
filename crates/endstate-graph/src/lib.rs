//! Endstate Graph — skill graph persistence.
//!
//! This crate is the single mutation point for the knowledge graph.
//! All graph reads and writes flow through the [`GraphStore`] trait to
//! ensure consistent session isolation and schema compliance. The Neo4j
//! implementation lives on [`GraphClient`]; [`MemoryGraphStore`] keeps the
//! same semantics in process.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraphStore;
pub use store::{ArtifactKind, GraphStore};
