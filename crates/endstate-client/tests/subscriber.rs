//! Client against a live server on a loopback port.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::{mpsc, watch};

use endstate_client::{Backoff, ChatClient, Subscriber, SubscriberConfig};
use endstate_core::config::{AppConfig, GraphBackend};
use endstate_core::{ChatEvent, ChatMessage, Role, SessionId};
use endstate_graph::MemoryGraphStore;
use endstate_llm::ScriptedProvider;
use endstate_server::{router, AppState};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn endstate(provider: ScriptedProvider) -> (String, AppState) {
    let mut config = AppConfig::default();
    config.graph.backend = GraphBackend::Memory;
    config.learning.auto_summarize = false;
    let state = AppState::new(config, Arc::new(MemoryGraphStore::new()), Arc::new(provider));
    let url = serve(router(state.clone())).await;
    (url, state)
}

fn fast_config() -> SubscriberConfig {
    SubscriberConfig {
        backoff: Backoff::new(Duration::from_millis(10), Duration::from_millis(50), 3),
        poll_interval: Duration::from_millis(20),
        sse_retry_after: Duration::from_millis(200),
    }
}

fn session(id: &str) -> SessionId {
    SessionId::parse(id).unwrap()
}

async fn next_matching(
    rx: &mut mpsc::Receiver<ChatEvent>,
    predicate: impl Fn(&ChatEvent) -> bool,
) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("subscriber stopped");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn subscriber_receives_turn() {
    let (url, _state) = endstate(ScriptedProvider::new(["Hello from the tutor"])).await;
    let client = ChatClient::new(&url, session("sub-1"));

    let subscriber = Subscriber::new(client.clone(), fast_config());
    let store = subscriber.store();
    let (tx, mut rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(subscriber.run(tx, shutdown_rx));

    next_matching(&mut rx, |e| matches!(e, ChatEvent::InitialMessages { .. })).await;

    let receipt = client.send("hi").await.unwrap();
    assert!(!receipt.duplicate);

    next_matching(&mut rx, |e| matches!(e, ChatEvent::ProcessingComplete { .. })).await;
    {
        let store = store.read().await;
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.messages()[1].content, "Hello from the tutor");
        assert!(!store.is_processing());
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn resent_request_id_is_deduplicated() {
    let (url, _state) = endstate(ScriptedProvider::new(["One reply"])).await;
    let client = ChatClient::new(&url, session("dedupe"));

    let first = client.send_with_id("hello", "fixed-id").await.unwrap();
    let second = client.send_with_id("hello", "fixed-id").await.unwrap();
    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(second.message, first.message);

    let cleared = client.reset().await.unwrap();
    assert!(cleared >= 1);
}

#[tokio::test]
async fn reconnects_after_stream_drop() {
    let (url, state) = endstate(ScriptedProvider::default()).await;
    let client = ChatClient::new(&url, session("drop"));

    let (tx, mut rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(Subscriber::new(client, fast_config()).run(tx, shutdown_rx));

    next_matching(&mut rx, |e| matches!(e, ChatEvent::InitialMessages { .. })).await;

    // Ends every open stream on the server side.
    state.sessions.shutdown();

    next_matching(&mut rx, |e| matches!(e, ChatEvent::InitialMessages { .. })).await;
}

#[tokio::test]
async fn falls_back_to_polling_without_sse() {
    let message = ChatMessage::assistant("Polled reply", Some("r1".to_string()));
    let snapshot = serde_json::json!({
        "session_id": "poll",
        "messages": [message],
        "processing": false,
    });
    // No stream route: every SSE attempt gets a 404.
    let app = Router::new().route(
        "/api/chat/:session_id/messages",
        get(move || {
            let snapshot = snapshot.clone();
            async move { Json(snapshot) }
        }),
    );
    let url = serve(app).await;

    let (tx, mut rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let client = ChatClient::new(&url, session("poll"));
    tokio::spawn(Subscriber::new(client, fast_config()).run(tx, shutdown_rx));

    let event = next_matching(&mut rx, |e| matches!(e, ChatEvent::MessageAdded { .. })).await;
    match event {
        ChatEvent::MessageAdded { message } => {
            assert_eq!(message.role, Role::Assistant);
            assert_eq!(message.content, "Polled reply");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
