//! Background generation jobs.
//!
//! Summary, skill-graph, and suggestion generation call the LLM and can take
//! tens of seconds. Jobs run on spawned tokio tasks; a semaphore caps how
//! many talk to the provider at once, and a per-session table records their
//! status for `GET /api/projects/{id}/jobs`.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

use endstate_core::SessionId;

/// Finished jobs kept per session.
const MAX_JOBS_PER_SESSION: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Summary,
    Graph,
    Suggestions,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobStatus {
    pub id: String,
    pub kind: JobKind,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

type JobTable = Arc<RwLock<HashMap<SessionId, Vec<JobStatus>>>>;

#[derive(Clone)]
pub struct JobRunner {
    concurrency: Arc<Semaphore>,
    jobs: JobTable,
}

impl JobRunner {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            concurrency: Arc::new(Semaphore::new(max_concurrent.max(1))),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Queue `task` on a background task and return its initial status.
    pub async fn submit<F, E>(&self, session_id: &SessionId, kind: JobKind, task: F) -> JobStatus
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let status = self.record(session_id, kind).await;
        let runner = self.clone();
        let session_id = session_id.clone();
        let job_id = status.id.clone();

        tokio::spawn(async move {
            let _ = runner.execute(&session_id, &job_id, task).await;
        });
        status
    }

    /// Run `task` on the caller's task, bounded and recorded like a background job.
    pub async fn run<F, T, E>(&self, session_id: &SessionId, kind: JobKind, task: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let status = self.record(session_id, kind).await;
        self.execute(session_id, &status.id, task).await
    }

    /// Jobs of a session, newest first.
    pub async fn list(&self, session_id: &SessionId) -> Vec<JobStatus> {
        let jobs = self.jobs.read().await;
        let mut list = jobs.get(session_id).cloned().unwrap_or_default();
        list.reverse();
        list
    }

    pub async fn get(&self, session_id: &SessionId, job_id: &str) -> Option<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.get(session_id)?.iter().find(|j| j.id == job_id).cloned()
    }

    pub async fn clear(&self, session_id: &SessionId) {
        self.jobs.write().await.remove(session_id);
    }

    async fn execute<F, T, E>(&self, session_id: &SessionId, job_id: &str, task: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let _permit = self.concurrency.acquire().await.ok();
        self.transition(session_id, job_id, JobState::Running, None)
            .await;

        let result = task.await;
        let (state, error) = match &result {
            Ok(_) => (JobState::Complete, None),
            Err(e) => (JobState::Failed, Some(e.to_string())),
        };
        match &error {
            None => tracing::info!(session_id = %session_id, job_id, "Job complete"),
            Some(e) => tracing::warn!(session_id = %session_id, job_id, error = %e, "Job failed"),
        }
        self.transition(session_id, job_id, state, error).await;
        result
    }

    async fn record(&self, session_id: &SessionId, kind: JobKind) -> JobStatus {
        let now = Utc::now();
        let status = JobStatus {
            id: Uuid::new_v4().to_string(),
            kind,
            state: JobState::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };

        let mut jobs = self.jobs.write().await;
        let list = jobs.entry(session_id.clone()).or_default();
        list.push(status.clone());
        if list.len() > MAX_JOBS_PER_SESSION {
            // Evict the oldest finished job, if there is one.
            if let Some(pos) = list
                .iter()
                .position(|j| matches!(j.state, JobState::Complete | JobState::Failed))
            {
                list.remove(pos);
            }
        }
        tracing::debug!(session_id = %session_id, job_id = %status.id, ?kind, "Job queued");
        status
    }

    async fn transition(
        &self,
        session_id: &SessionId,
        job_id: &str,
        state: JobState,
        error: Option<String>,
    ) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs
            .get_mut(session_id)
            .and_then(|list| list.iter_mut().find(|j| j.id == job_id))
        {
            job.state = state;
            job.error = error;
            job.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sid() -> SessionId {
        SessionId::parse("jobs").unwrap()
    }

    async fn wait_for(runner: &JobRunner, job_id: &str, state: JobState) -> JobStatus {
        for _ in 0..100 {
            if let Some(job) = runner.get(&sid(), job_id).await {
                if job.state == state {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached {state:?}");
    }

    #[tokio::test]
    async fn background_job_completes() {
        let runner = JobRunner::new(2);
        let status = runner
            .submit(&sid(), JobKind::Graph, async { Ok::<_, String>(()) })
            .await;
        assert_eq!(status.state, JobState::Pending);

        wait_for(&runner, &status.id, JobState::Complete).await;
        assert_eq!(runner.list(&sid()).await.len(), 1);
    }

    #[tokio::test]
    async fn failure_is_recorded() {
        let runner = JobRunner::new(1);
        let status = runner
            .submit(&sid(), JobKind::Summary, async {
                Err::<(), _>("provider unavailable")
            })
            .await;

        let job = wait_for(&runner, &status.id, JobState::Failed).await;
        assert_eq!(job.error.as_deref(), Some("provider unavailable"));
    }

    #[tokio::test]
    async fn inline_run_returns_value() {
        let runner = JobRunner::new(1);
        let value = runner
            .run(&sid(), JobKind::Suggestions, async { Ok::<_, String>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(runner.list(&sid()).await[0].state, JobState::Complete);

        runner.clear(&sid()).await;
        assert!(runner.list(&sid()).await.is_empty());
    }
}
