//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use endstate_core::config::AppConfig;
use endstate_core::types::{ProjectSuggestion, ProjectSummary};
use endstate_core::{ChatMessage, SessionId};
use endstate_graph::GraphStore;
use endstate_llm::{LlmProvider, Tutor};

use crate::api::ApiError;
use crate::jobs::{JobKind, JobRunner};
use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionRegistry>,
    pub graph: Arc<dyn GraphStore>,
    pub tutor: Tutor,
    pub jobs: JobRunner,
    /// Latest project suggestions per session.
    pub suggestions: Arc<RwLock<HashMap<SessionId, Vec<ProjectSuggestion>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, graph: Arc<dyn GraphStore>, provider: Arc<dyn LlmProvider>) -> Self {
        let tutor = Tutor::new(provider, config.learning.history_window);
        Self {
            sessions: Arc::new(SessionRegistry::new(config.server.max_idempotency_keys)),
            jobs: JobRunner::new(config.llm.max_concurrent_jobs),
            graph,
            tutor,
            suggestions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// Queue a background refresh of the session's project summary.
    pub async fn refresh_summary(&self, session_id: &SessionId) {
        let Some(session) = self.sessions.get(session_id).await else {
            return;
        };
        let state = self.clone();
        let id = session_id.clone();
        self.jobs
            .submit(session_id, JobKind::Summary, async move {
                let history = session.history().await;
                state.update_summary(&id, &history).await.map(|_| ())
            })
            .await;
    }

    /// Re-extract and store the project summary from a conversation.
    ///
    /// An agreed project already on record survives a re-extraction that
    /// found none.
    pub async fn update_summary(
        &self,
        session_id: &SessionId,
        history: &[ChatMessage],
    ) -> Result<ProjectSummary, ApiError> {
        let mut summary = self.tutor.summarize(session_id, history).await?;
        if summary.agreed_project.is_none() {
            if let Some(existing) = self.graph.load_summary(session_id).await? {
                summary.agreed_project = existing.agreed_project;
            }
        }
        self.graph.save_summary(&summary).await?;
        tracing::info!(session_id = %session_id, "Project summary updated");
        Ok(summary)
    }
}
