//! Keeps a [`ChatStore`] in sync with the server.
//!
//! The subscriber holds an SSE connection open and reconnects with
//! exponential backoff when it drops. After too many consecutive failures it
//! polls the messages endpoint instead, and periodically tries SSE again.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::Instant;

use endstate_core::ChatEvent;

use crate::backoff::Backoff;
use crate::client::ChatClient;
use crate::store::ChatStore;

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub backoff: Backoff,
    /// Delay between polls while SSE is unavailable.
    pub poll_interval: Duration,
    /// How long to poll before trying SSE again.
    pub sse_retry_after: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            poll_interval: Duration::from_secs(2),
            sse_retry_after: Duration::from_secs(30),
        }
    }
}

pub struct Subscriber {
    client: ChatClient,
    store: Arc<RwLock<ChatStore>>,
    config: SubscriberConfig,
}

impl Subscriber {
    pub fn new(client: ChatClient, config: SubscriberConfig) -> Self {
        let store = ChatStore::new(client.session_id().clone());
        Self {
            client,
            store: Arc::new(RwLock::new(store)),
            config,
        }
    }

    pub fn store(&self) -> Arc<RwLock<ChatStore>> {
        self.store.clone()
    }

    /// Run until `shutdown` turns true or `updates` is closed.
    ///
    /// Every event that changed the store is forwarded to `updates`. While
    /// polling, newly seen messages are forwarded as `message_added` and lock
    /// changes as `processing_started` / `processing_complete`.
    pub async fn run(self, updates: mpsc::Sender<ChatEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.config.backoff.clone();
        loop {
            if *shutdown.borrow() || updates.is_closed() {
                break;
            }

            match self.client.stream().await {
                Ok(events) => {
                    backoff.reset();
                    tracing::info!(session_id = %self.client.session_id(), "Event stream connected");
                    futures::pin_mut!(events);
                    loop {
                        let next = tokio::select! {
                            next = events.next() => next,
                            _ = shutdown.changed() => return,
                        };
                        match next {
                            Some(Ok(event)) => {
                                if !self.forward(event, &updates).await {
                                    return;
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "Event stream failed");
                                break;
                            }
                            None => break,
                        }
                    }
                    tracing::info!(session_id = %self.client.session_id(), "Event stream dropped");
                }
                Err(e) => tracing::warn!(error = %e, "Could not open event stream"),
            }

            match backoff.next_delay() {
                Some(delay) => {
                    tracing::debug!(delay_ms = delay.as_millis() as u64, attempt = backoff.attempts(), "Reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return,
                    }
                }
                None => {
                    tracing::warn!(attempts = backoff.attempts(), "Falling back to polling");
                    if !self.poll(&updates, &mut shutdown).await {
                        return;
                    }
                    backoff.reset();
                }
            }
        }
    }

    /// Poll for `sse_retry_after`. Returns false when the subscriber should stop.
    async fn poll(&self, updates: &mpsc::Sender<ChatEvent>, shutdown: &mut watch::Receiver<bool>) -> bool {
        let until = Instant::now() + self.config.sse_retry_after;
        while Instant::now() < until {
            let since = self.store.read().await.last_timestamp();
            match self.client.messages(since).await {
                Ok(snapshot) => {
                    let events = self
                        .store
                        .write()
                        .await
                        .merge_snapshot(snapshot.messages, snapshot.processing);
                    for event in events {
                        if updates.send(event).await.is_err() {
                            return false;
                        }
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Poll failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => return false,
            }
        }
        true
    }

    async fn forward(&self, event: ChatEvent, updates: &mpsc::Sender<ChatEvent>) -> bool {
        let changed = self.store.write().await.apply(&event);
        if !changed {
            return true;
        }
        updates.send(event).await.is_ok()
    }
}
