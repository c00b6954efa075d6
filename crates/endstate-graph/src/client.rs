//! Neo4j connection management and shared graph client.

use endstate_core::config::Neo4jConfig;
use endstate_core::NodeLabel;
use neo4rs::{query, ConfigBuilder, Graph, Query};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Node not found: {label} with id {id} in session {session_id}")]
    NotFound {
        label: String,
        id: String,
        session_id: String,
    },

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from(&Neo4jConfig::default())
    }
}

impl From<&Neo4jConfig> for GraphConfig {
    fn from(c: &Neo4jConfig) -> Self {
        Self {
            uri: c.uri.clone(),
            user: c.user.clone(),
            password: c.password.clone(),
            max_connections: c.max_connections,
            fetch_size: c.fetch_size,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Create the lookup indexes used by every session-scoped query.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for label in NodeLabel::ALL {
            let label = label.as_str();
            let cypher = format!(
                "CREATE INDEX {}_session_id IF NOT EXISTS FOR (n:{label}) ON (n.session_id, n.id)",
                label.to_lowercase()
            );
            self.run(query(&cypher)).await?;
        }
        self.run(query(
            "CREATE INDEX summary_session IF NOT EXISTS FOR (s:Summary) ON (s.session_id)",
        ))
        .await?;
        tracing::debug!("Neo4j indexes ensured");
        Ok(())
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<neo4rs::Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }
}
