//! Configuration management for Endstate services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`ENDSTATE__` prefix, `__` separator,
//!    e.g. `ENDSTATE__NEO4J__URI`)
//! 2. Config file (`endstate.toml`, prefix overridable)
//! 3. Defaults

use serde::Deserialize;

use crate::error::EndstateError;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
    #[serde(default)]
    pub graph: GraphBackendConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub learning: LearningConfig,
}

impl AppConfig {
    /// Load from `{file_prefix}.toml` (optional) overlaid with `ENDSTATE__*` env vars.
    pub fn load(file_prefix: &str) -> Result<Self, EndstateError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("ENDSTATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), EndstateError> {
        if !(0.0..=1.0).contains(&self.learning.mastery_threshold) {
            return Err(EndstateError::Config(
                "learning.mastery_threshold must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.llm.max_concurrent_jobs == 0 {
            return Err(EndstateError::Config(
                "llm.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.llm.provider == LlmProviderKind::Gemini && self.llm.api_key.is_empty() {
            tracing::warn!("llm.api_key is empty; Gemini requests will be rejected");
        }
        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between SSE heartbeat events.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Request ids remembered per session for `X-Request-ID` deduplication.
    #[serde(default = "default_max_idempotency_keys")]
    pub max_idempotency_keys: usize,

    /// Chat sessions untouched this long are dropped from memory. 0 keeps them forever.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

/// Neo4j connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jConfig {
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,
    #[serde(default = "default_neo4j_user")]
    pub user: String,
    #[serde(default = "default_neo4j_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    #[default]
    Neo4j,
    /// In-process store; state is lost on restart.
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphBackendConfig {
    #[serde(default)]
    pub backend: GraphBackend,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Gemini,
    Ollama,
}

/// LLM provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProviderKind,

    /// Model name; empty selects the provider default.
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub api_key: String,

    /// Base URL override (Ollama host, or a Gemini-compatible proxy).
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent background generation jobs.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

/// Tutoring and scoring settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LearningConfig {
    /// Number of most recent messages sent to the LLM per turn.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Assessment score (0.0–1.0) at or above which a node is mastered.
    #[serde(default = "default_mastery_threshold")]
    pub mastery_threshold: f64,

    /// Capstone overall score (0–10) required to pass.
    #[serde(default = "default_capstone_pass_score")]
    pub capstone_pass_score: f64,

    /// Refresh the project summary in the background after each chat turn.
    #[serde(default = "default_true")]
    pub auto_summarize: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_max_idempotency_keys() -> usize {
    256
}

fn default_session_idle_secs() -> u64 {
    3600
}

fn default_neo4j_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_neo4j_password() -> String {
    "endstate-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_history_window() -> usize {
    40
}

fn default_mastery_threshold() -> f64 {
    0.7
}

fn default_capstone_pass_score() -> f64 {
    7.0
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            heartbeat_secs: default_heartbeat_secs(),
            cors_origins: Vec::new(),
            max_idempotency_keys: default_max_idempotency_keys(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: default_neo4j_uri(),
            user: default_neo4j_user(),
            password: default_neo4j_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            model: String::new(),
            api_key: String::new(),
            base_url: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            mastery_threshold: default_mastery_threshold(),
            capstone_pass_score: default_capstone_pass_score(),
            auto_summarize: true,
        }
    }
}
