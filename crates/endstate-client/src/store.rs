//! Client-side view of a chat session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use endstate_core::{ChatEvent, ChatMessage, Role, SessionId};

/// Messages of one session kept in sync from SSE events and polled snapshots.
///
/// Each turn's user and assistant messages share a request id; a message
/// arriving again for a known `(request_id, role)` replaces the stored one.
#[derive(Debug)]
pub struct ChatStore {
    session_id: SessionId,
    messages: Vec<ChatMessage>,
    index: HashMap<(String, Role), usize>,
    processing: bool,
    current_request: Option<String>,
    last_error: Option<String>,
}

impl ChatStore {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            index: HashMap::new(),
            processing: false,
            current_request: None,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn current_request(&self) -> Option<&str> {
        self.current_request.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Timestamp of the newest message, for `?since=` polling.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.messages.iter().map(|m| m.timestamp).max()
    }

    /// Apply a server event. Returns whether the store changed.
    pub fn apply(&mut self, event: &ChatEvent) -> bool {
        match event {
            ChatEvent::InitialMessages {
                messages,
                processing,
            } => {
                self.replace_all(messages.clone());
                self.processing = *processing;
                if !processing {
                    self.current_request = None;
                }
                true
            }
            ChatEvent::MessageAdded { message } => self.upsert(message.clone()),
            ChatEvent::ProcessingStarted { request_id } => {
                self.processing = true;
                self.current_request = Some(request_id.clone());
                self.last_error = None;
                true
            }
            ChatEvent::ProcessingComplete { request_id }
            | ChatEvent::ProcessingCancelled { request_id } => self.release(request_id),
            ChatEvent::Error {
                message,
                request_id,
            } => {
                self.last_error = Some(message.clone());
                if let Some(request_id) = request_id {
                    self.release(request_id);
                }
                true
            }
            ChatEvent::Heartbeat { .. } => false,
        }
    }

    /// Merge a polled snapshot.
    ///
    /// Returns the events a stream subscriber would have seen: `message_added`
    /// for each message not known yet, then `processing_started` or
    /// `processing_complete` when the lock flipped.
    pub fn merge_snapshot(&mut self, messages: Vec<ChatMessage>, processing: bool) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        for message in messages {
            let known = match &message.request_id {
                Some(id) => self.index.contains_key(&(id.clone(), message.role)),
                None => self.messages.contains(&message),
            };
            if !known {
                events.push(ChatEvent::MessageAdded {
                    message: message.clone(),
                });
            }
            self.upsert(message);
        }

        match (self.processing, processing) {
            (false, true) => {
                let request_id = self.latest_user_request().unwrap_or_default();
                self.processing = true;
                self.current_request = Some(request_id.clone());
                events.push(ChatEvent::ProcessingStarted { request_id });
            }
            (true, false) => {
                let request_id = self
                    .current_request
                    .take()
                    .or_else(|| self.latest_user_request())
                    .unwrap_or_default();
                self.processing = false;
                events.push(ChatEvent::ProcessingComplete { request_id });
            }
            _ => {}
        }
        events
    }

    fn latest_user_request(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .find_map(|m| m.request_id.clone())
    }

    /// Drop all local state, as after a reset.
    pub fn clear(&mut self) {
        self.replace_all(Vec::new());
        self.processing = false;
        self.current_request = None;
        self.last_error = None;
    }

    fn upsert(&mut self, message: ChatMessage) -> bool {
        let Some(request_id) = message.request_id.clone() else {
            if self.messages.contains(&message) {
                return false;
            }
            self.messages.push(message);
            return true;
        };
        let key = (request_id, message.role);
        match self.index.get(&key) {
            Some(&i) if self.messages[i] == message => false,
            Some(&i) => {
                self.messages[i] = message;
                true
            }
            None => {
                self.index.insert(key, self.messages.len());
                self.messages.push(message);
                true
            }
        }
    }

    fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.messages.clear();
        self.index.clear();
        for message in messages {
            self.upsert(message);
        }
    }

    fn release(&mut self, request_id: &str) -> bool {
        if self.current_request.as_deref().map_or(true, |current| current == request_id) {
            self.processing = false;
            self.current_request = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChatStore {
        ChatStore::new(SessionId::parse("s1").unwrap())
    }

    fn user(content: &str, request_id: &str) -> ChatMessage {
        ChatMessage::user(content, Some(request_id.to_string()))
    }

    #[test]
    fn turn_events_update_messages_and_lock() {
        let mut store = store();
        store.apply(&ChatEvent::MessageAdded {
            message: user("hi", "r1"),
        });
        store.apply(&ChatEvent::ProcessingStarted {
            request_id: "r1".to_string(),
        });
        assert!(store.is_processing());
        assert_eq!(store.current_request(), Some("r1"));

        store.apply(&ChatEvent::MessageAdded {
            message: ChatMessage::assistant("hello", Some("r1".to_string())),
        });
        store.apply(&ChatEvent::ProcessingComplete {
            request_id: "r1".to_string(),
        });
        assert!(!store.is_processing());
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn known_request_id_replaces_instead_of_duplicating() {
        let mut store = store();
        let message = user("draft", "r1");
        assert!(store.apply(&ChatEvent::MessageAdded {
            message: message.clone()
        }));
        assert!(!store.apply(&ChatEvent::MessageAdded {
            message: message.clone()
        }));

        let mut edited = message;
        edited.content = "final".to_string();
        store.apply(&ChatEvent::MessageAdded { message: edited });
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].content, "final");
    }

    #[test]
    fn initial_messages_replace_everything() {
        let mut store = store();
        store.apply(&ChatEvent::MessageAdded {
            message: user("old", "r0"),
        });
        store.apply(&ChatEvent::InitialMessages {
            messages: vec![user("a", "r1"), user("b", "r2")],
            processing: true,
        });
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.messages()[0].content, "a");
        assert!(store.is_processing());
    }

    #[test]
    fn error_with_request_id_releases_lock() {
        let mut store = store();
        store.apply(&ChatEvent::ProcessingStarted {
            request_id: "r1".to_string(),
        });
        store.apply(&ChatEvent::Error {
            message: "provider down".to_string(),
            request_id: Some("r1".to_string()),
        });
        assert!(!store.is_processing());
        assert_eq!(store.last_error(), Some("provider down"));
    }

    #[test]
    fn completion_of_another_request_keeps_lock() {
        let mut store = store();
        store.apply(&ChatEvent::ProcessingStarted {
            request_id: "r2".to_string(),
        });
        assert!(!store.apply(&ChatEvent::ProcessingCancelled {
            request_id: "r1".to_string(),
        }));
        assert!(store.is_processing());
    }

    #[test]
    fn merge_snapshot_reports_only_new_messages() {
        let mut store = store();
        let first = user("a", "r1");
        store.apply(&ChatEvent::MessageAdded {
            message: first.clone(),
        });

        let reply = ChatMessage::assistant("b", Some("r1".to_string()));
        let events = store.merge_snapshot(vec![first, reply.clone()], false);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ChatEvent::MessageAdded { message } if *message == reply));
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.last_timestamp(), Some(store.messages()[1].timestamp));
    }

    #[test]
    fn merge_snapshot_reports_lock_changes() {
        let mut store = store();
        let question = user("a", "r1");
        let events = store.merge_snapshot(vec![question.clone()], true);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            ChatEvent::ProcessingStarted { request_id } if request_id == "r1"
        ));
        assert!(store.is_processing());
        assert_eq!(store.current_request(), Some("r1"));

        // Still busy: nothing new to report.
        assert!(store.merge_snapshot(vec![question], true).is_empty());

        let reply = ChatMessage::assistant("b", Some("r1".to_string()));
        let events = store.merge_snapshot(vec![reply], false);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            ChatEvent::ProcessingComplete { request_id } if request_id == "r1"
        ));
        assert!(!store.is_processing());
        assert_eq!(store.current_request(), None);
    }

    #[test]
    fn heartbeat_changes_nothing() {
        let mut store = store();
        assert!(!store.apply(&ChatEvent::heartbeat()));
        store.clear();
        assert!(store.messages().is_empty());
    }
}
