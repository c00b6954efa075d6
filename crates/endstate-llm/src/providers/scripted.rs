//! A provider that replays queued responses, for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LlmError, Result};
use crate::provider::{Completion, CompletionRequest, LlmProvider};

enum Scripted {
    Reply(String),
    Fail { status: u16, body: String },
}

/// Returns queued completions in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedProvider {
    queue: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::default();
        for reply in replies {
            provider.push(reply);
        }
        provider
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, reply: impl Into<String>) {
        self.lock_queue().push_back(Scripted::Reply(reply.into()));
    }

    /// Queue a provider failure.
    pub fn push_failure(&self, status: u16, body: impl Into<String>) {
        self.lock_queue().push_back(Scripted::Fail {
            status,
            body: body.into(),
        });
    }

    pub fn remaining(&self) -> usize {
        self.lock_queue().len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.lock_queue().pop_front();
        match next {
            Some(Scripted::Reply(content)) => Ok(Completion {
                content,
                model: self.model().to_string(),
                duration_ms: 0,
            }),
            Some(Scripted::Fail { status, body }) => Err(LlmError::Provider { status, body }),
            None => Err(LlmError::Exhausted),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_exhausts() {
        let provider = ScriptedProvider::new(["one", "two"]);
        provider.push_failure(503, "overloaded");

        let first = provider.complete(CompletionRequest::new("a")).await.unwrap();
        let second = provider.complete(CompletionRequest::new("b")).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(second.content, "two");

        let err = provider.complete(CompletionRequest::new("c")).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider { status: 503, .. }));
        let err = provider.complete(CompletionRequest::new("d")).await.unwrap_err();
        assert!(matches!(err, LlmError::Exhausted));

        let systems: Vec<_> = provider
            .requests()
            .into_iter()
            .filter_map(|r| r.system)
            .collect();
        assert_eq!(systems, vec!["a", "b", "c", "d"]);
    }
}
