//! In-memory chat sessions.
//!
//! Each session owns its transcript, the processing lock for the turn in
//! flight, the `X-Request-ID` idempotency table, and a broadcast channel
//! feeding every SSE subscriber.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use endstate_core::{ChatEvent, ChatMessage, SessionId};

const EVENT_CAPACITY: usize = 256;

/// What a sender gets back for an accepted (or replayed) message.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessageReceipt {
    pub session_id: SessionId,
    pub request_id: String,
    pub message: ChatMessage,
}

/// Outcome of trying to start a chat turn.
#[derive(Debug)]
pub enum TurnStart {
    /// The message was appended; the caller must run the turn.
    Accepted {
        receipt: MessageReceipt,
        history: Vec<ChatMessage>,
    },
    /// This request id was already processed.
    Duplicate(MessageReceipt),
    /// Another turn holds the lock.
    Busy { request_id: String },
}

struct SessionState {
    messages: Vec<ChatMessage>,
    /// Request id of the turn in flight.
    processing: Option<String>,
    abort: Option<AbortHandle>,
    receipts: HashMap<String, MessageReceipt>,
    receipt_order: VecDeque<String>,
    last_active: Instant,
}

impl SessionState {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            processing: None,
            abort: None,
            receipts: HashMap::new(),
            receipt_order: VecDeque::new(),
            last_active: Instant::now(),
        }
    }
}

pub struct ChatSession {
    id: SessionId,
    state: Mutex<SessionState>,
    events: broadcast::Sender<ChatEvent>,
    max_receipts: usize,
}

impl ChatSession {
    fn new(id: SessionId, max_receipts: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id,
            state: Mutex::new(SessionState::new()),
            events,
            max_receipts: max_receipts.max(1),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Take the processing lock and append the user message.
    pub async fn begin_turn(&self, content: &str, request_id: &str) -> TurnStart {
        let mut state = self.state.lock().await;
        state.last_active = Instant::now();

        if let Some(receipt) = state.receipts.get(request_id) {
            return TurnStart::Duplicate(receipt.clone());
        }
        if let Some(current) = &state.processing {
            return TurnStart::Busy {
                request_id: current.clone(),
            };
        }

        let message = ChatMessage::user(content.trim(), Some(request_id.to_string()));
        let receipt = MessageReceipt {
            session_id: self.id.clone(),
            request_id: request_id.to_string(),
            message: message.clone(),
        };

        state.messages.push(message.clone());
        state.processing = Some(request_id.to_string());
        state
            .receipts
            .insert(request_id.to_string(), receipt.clone());
        state.receipt_order.push_back(request_id.to_string());
        while state.receipt_order.len() > self.max_receipts {
            if let Some(oldest) = state.receipt_order.pop_front() {
                state.receipts.remove(&oldest);
            }
        }

        self.publish(ChatEvent::MessageAdded { message });
        self.publish(ChatEvent::ProcessingStarted {
            request_id: request_id.to_string(),
        });

        TurnStart::Accepted {
            receipt,
            history: state.messages.clone(),
        }
    }

    /// Remember how to cancel the task running `request_id`.
    pub async fn attach_task(&self, request_id: &str, handle: AbortHandle) {
        let mut state = self.state.lock().await;
        if state.processing.as_deref() == Some(request_id) {
            state.abort = Some(handle);
        }
    }

    /// Record the outcome of a turn and release the lock.
    ///
    /// Returns false (and discards the outcome) if the turn was cancelled
    /// in the meantime.
    pub async fn finish_turn(&self, request_id: &str, outcome: Result<String, String>) -> bool {
        let mut state = self.state.lock().await;
        if state.processing.as_deref() != Some(request_id) {
            tracing::debug!(session_id = %self.id, request_id, "Discarding outcome of cancelled turn");
            return false;
        }
        state.processing = None;
        state.abort = None;
        state.last_active = Instant::now();

        match outcome {
            Ok(reply) => {
                let message = ChatMessage::assistant(reply, Some(request_id.to_string()));
                state.messages.push(message.clone());
                self.publish(ChatEvent::MessageAdded { message });
                self.publish(ChatEvent::ProcessingComplete {
                    request_id: request_id.to_string(),
                });
                true
            }
            Err(message) => {
                self.publish(ChatEvent::Error {
                    message,
                    request_id: Some(request_id.to_string()),
                });
                false
            }
        }
    }

    /// Abort the turn in flight and clear the transcript and idempotency keys.
    ///
    /// Returns the number of messages cleared.
    pub async fn reset(&self) -> usize {
        let mut state = self.state.lock().await;
        if let Some(request_id) = state.processing.take() {
            if let Some(handle) = state.abort.take() {
                handle.abort();
            }
            tracing::info!(session_id = %self.id, request_id = %request_id, "Cancelled turn in flight");
            self.publish(ChatEvent::ProcessingCancelled { request_id });
        }
        let cleared = state.messages.len();
        state.messages.clear();
        state.receipts.clear();
        state.receipt_order.clear();
        self.publish(ChatEvent::InitialMessages {
            messages: Vec::new(),
            processing: false,
        });
        cleared
    }

    /// Messages (optionally only those after `since`) and the processing flag.
    pub async fn snapshot(&self, since: Option<DateTime<Utc>>) -> (Vec<ChatMessage>, bool) {
        let mut state = self.state.lock().await;
        state.last_active = Instant::now();
        let messages = match since {
            Some(since) => state
                .messages
                .iter()
                .filter(|m| m.timestamp > since)
                .cloned()
                .collect(),
            None => state.messages.clone(),
        };
        (messages, state.processing.is_some())
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.state.lock().await.messages.clone()
    }

    /// Subscribe to events together with a consistent snapshot: nothing
    /// published after the snapshot is missed.
    pub async fn subscribe(&self) -> (broadcast::Receiver<ChatEvent>, Vec<ChatMessage>, bool) {
        let mut state = self.state.lock().await;
        state.last_active = Instant::now();
        let receiver = self.events.subscribe();
        (receiver, state.messages.clone(), state.processing.is_some())
    }

    /// No turn in flight, no open event stream, and untouched for `max_idle`.
    pub async fn is_idle(&self, max_idle: Duration) -> bool {
        if self.events.receiver_count() > 0 {
            return false;
        }
        let state = self.state.lock().await;
        state.processing.is_none() && state.last_active.elapsed() >= max_idle
    }

    fn publish(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// All live chat sessions, created on first use.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<ChatSession>>>,
    max_receipts: usize,
    shutdown: watch::Sender<bool>,
}

impl SessionRegistry {
    pub fn new(max_receipts: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_receipts,
            shutdown,
        }
    }

    pub async fn get_or_create(&self, id: &SessionId) -> Arc<ChatSession> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.clone())
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, "Created chat session");
                Arc::new(ChatSession::new(id.clone(), self.max_receipts))
            })
            .clone()
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<ChatSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle for at least `max_idle`. Returns how many were dropped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut idle = Vec::new();
        for (id, session) in sessions.iter() {
            if session.is_idle(max_idle).await {
                idle.push(id.clone());
            }
        }
        for id in &idle {
            sessions.remove(id);
            tracing::debug!(session_id = %id, "Evicted idle chat session");
        }
        idle.len()
    }

    /// Periodically evict idle sessions until shutdown.
    pub async fn run_eviction(self: Arc<Self>, max_idle: Duration) {
        let period = (max_idle / 4).max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        let mut shutdown = self.shutdown_signal();
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => return,
            }
            let evicted = self.evict_idle(max_idle).await;
            if evicted > 0 {
                let remaining = self.len().await;
                tracing::info!(evicted, remaining, "Evicted idle chat sessions");
            }
        }
    }

    /// Signal every open event stream to end.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
