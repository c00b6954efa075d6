//! HTTP server entry point for Endstate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use endstate_core::config::{AppConfig, GraphBackend};
use endstate_graph::{GraphClient, GraphConfig, GraphStore, MemoryGraphStore};
use endstate_server::{router, AppState};

#[derive(Parser)]
#[command(name = "endstate-server")]
#[command(about = "Chat tutor, skill graph, and assessment API for Endstate")]
struct Cli {
    /// Config file prefix (default: endstate).
    #[arg(short, long, default_value = "endstate")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Keep the skill graph in memory instead of Neo4j.
    #[arg(long)]
    memory_graph: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config).context("failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.memory_graph {
        config.graph.backend = GraphBackend::Memory;
    }

    let graph: Arc<dyn GraphStore> = match config.graph.backend {
        GraphBackend::Neo4j => {
            let client = GraphClient::connect(&GraphConfig::from(&config.neo4j)).await?;
            client.ensure_schema().await?;
            Arc::new(client)
        }
        GraphBackend::Memory => {
            tracing::warn!("Using the in-memory graph store; skill graphs are lost on restart");
            Arc::new(MemoryGraphStore::new())
        }
    };

    let provider = endstate_llm::provider_from_config(&config.llm)?;
    tracing::info!(provider = provider.name(), model = provider.model(), "LLM provider ready");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let session_idle_secs = config.server.session_idle_secs;
    let state = AppState::new(config, graph, provider);
    let sessions = state.sessions.clone();
    if session_idle_secs > 0 {
        tokio::spawn(sessions.clone().run_eviction(Duration::from_secs(session_idle_secs)));
    }
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Endstate server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutting down");
            sessions.shutdown();
        })
        .await?;

    Ok(())
}
