//! HTTP-level tests against the in-memory graph store and a scripted LLM.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use endstate_core::config::{AppConfig, GraphBackend};
use endstate_graph::MemoryGraphStore;
use endstate_llm::ScriptedProvider;
use endstate_server::{router, AppState};

fn app(provider: ScriptedProvider) -> (Router, Arc<ScriptedProvider>) {
    let provider = Arc::new(provider);
    let mut config = AppConfig::default();
    config.graph.backend = GraphBackend::Memory;
    config.learning.auto_summarize = false;
    config.server.heartbeat_secs = 1;
    let state = AppState::new(config, Arc::new(MemoryGraphStore::new()), provider.clone());
    (router(state), provider)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn send(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn chat(session: &str, content: &str, request_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/api/chat/{session}/messages"))
        .header("content-type", "application/json");
    if let Some(id) = request_id {
        builder = builder.header("x-request-id", id);
    }
    builder
        .body(Body::from(json!({ "content": content }).to_string()))
        .unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Poll the messages endpoint until no turn is in flight.
async fn settled_messages(app: &Router, session: &str) -> Vec<Value> {
    for _ in 0..200 {
        let (_, body) = call(app, get(&format!("/api/chat/{session}/messages"))).await;
        if body["processing"] == false {
            return body["messages"].as_array().cloned().unwrap_or_default();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("chat turn never finished");
}

async fn wait_for_job(app: &Router, session: &str) -> Value {
    for _ in 0..200 {
        let (_, body) = call(app, get(&format!("/api/projects/{session}/jobs"))).await;
        let job = body["jobs"][0].clone();
        if job["state"] == "complete" || job["state"] == "failed" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never finished");
}

fn node_named<'a>(graph: &'a Value, name: &str) -> &'a Value {
    graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["properties"]["name"] == name)
        .unwrap_or_else(|| panic!("no node named {name}"))
}

#[tokio::test]
async fn health_reports_backends() {
    let (app, _) = app(ScriptedProvider::default());
    let (status, body) = call(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["graph_backend"], "memory");
    assert_eq!(body["llm_provider"], "scripted");
}

#[tokio::test]
async fn send_then_poll() {
    let (app, _) = app(ScriptedProvider::new(["What would you like to build?"]));

    let (status, body) = call(&app, chat("s1", "  I want to learn Rust ", Some("req-1"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["request_id"], "req-1");
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["message"]["content"], "I want to learn Rust");
    assert_eq!(body["message"]["role"], "user");

    let messages = settled_messages(&app, "s1").await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "What would you like to build?");
    assert_eq!(messages[1]["request_id"], "req-1");

    let since = messages[0]["timestamp"].as_str().unwrap();
    let (_, body) = call(&app, get(&format!("/api/chat/s1/messages?since={since}"))).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn request_id_is_generated_when_absent() {
    let (app, _) = app(ScriptedProvider::new(["Hi"]));
    let (status, body) = call(&app, chat("s1", "hello", None)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(!body["request_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_request_id_is_not_reprocessed() {
    let (app, provider) = app(ScriptedProvider::new(["First answer", "Second answer"]));

    let (status, _) = call(&app, chat("dup", "hello", Some("same-id"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    settled_messages(&app, "dup").await;

    let (status, body) = call(&app, chat("dup", "hello", Some("same-id"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicate"], true);
    assert_eq!(body["request_id"], "same-id");

    let messages = settled_messages(&app, "dup").await;
    assert_eq!(messages.len(), 2);
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(provider.remaining(), 1);
}

#[tokio::test]
async fn busy_session_conflicts_until_reset() {
    let (app, _) = app(ScriptedProvider::new(["slow"]).with_delay(Duration::from_secs(5)));

    let (status, _) = call(&app, chat("busy", "first", Some("r1"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = call(&app, chat("busy", "second", Some("r2"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("r1"));

    let (status, body) = call(&app, send("POST", "/api/chat/busy/reset", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let (_, body) = call(&app, get("/api/chat/busy/messages")).await;
    assert_eq!(body["processing"], false);
    assert!(body["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_turn_keeps_user_message_and_releases_lock() {
    let provider = ScriptedProvider::default();
    provider.push_failure(503, "overloaded");
    provider.push("Recovered");
    let (app, _) = app(provider);

    call(&app, chat("flaky", "hello", Some("r1"))).await;
    let messages = settled_messages(&app, "flaky").await;
    assert_eq!(messages.len(), 1);

    let (status, _) = call(&app, chat("flaky", "again", Some("r2"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(settled_messages(&app, "flaky").await.len(), 3);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (app, _) = app(ScriptedProvider::default());

    let (status, body) = call(&app, chat("s1", "   ", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = call(&app, chat("bad%20id", "hello", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, get("/api/graph")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, get("/api/projects/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, send("POST", "/api/projects/nobody", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, get("/api/nodes/missing/lesson?session_id=nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stream_starts_with_initial_messages() {
    let (app, _) = app(ScriptedProvider::default());
    let response = app
        .clone()
        .oneshot(get("/api/chat/sse/stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    let frame = String::from_utf8_lossy(&first);
    assert!(frame.contains("event: initial_messages"));
    assert!(frame.contains("\"processing\":false"));
}

#[tokio::test]
async fn stream_relays_turn_events() {
    let (app, _) = app(ScriptedProvider::new(["Welcome"]));
    let response = app
        .clone()
        .oneshot(get("/api/chat/live/stream"))
        .await
        .unwrap();
    let mut body = response.into_body().into_data_stream();
    body.next().await.unwrap().unwrap();

    call(&app, chat("live", "hello", Some("r1"))).await;

    let mut seen = String::new();
    while !seen.contains("event: processing_complete") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("stream stalled")
            .unwrap()
            .unwrap();
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    let started = seen.find("event: processing_started").unwrap();
    let reply = seen.find("Welcome").unwrap();
    assert!(started < reply);
}

#[tokio::test]
async fn learning_flow_end_to_end() {
    let summary = json!({
        "user_profile": { "experience_level": "beginner", "goals": ["learn Rust"] },
        "agreed_project": { "title": "Todo CLI", "description": "A command-line todo list" },
        "topics": ["CLI"],
        "skills": ["Argument parsing"],
        "concepts": ["Ownership", "Enums"]
    });
    let graph = json!({
        "nodes": [
            { "label": "Project", "name": "Todo CLI" },
            { "label": "Skill", "name": "Argument parsing" },
            { "label": "Concept", "name": "Ownership" },
            { "label": "Concept", "name": "Enums" }
        ],
        "relationships": [
            { "source": "Todo CLI", "target": "Argument parsing", "type": "REQUIRES" },
            { "source": "Argument parsing", "target": "Ownership", "type": "USES" },
            { "source": "Argument parsing", "target": "Enums", "type": "USES" }
        ]
    });
    let suggestions = json!({
        "projects": [{ "title": "Todo CLI", "description": "Track tasks", "difficulty": "beginner", "skills": ["clap"] }]
    });
    let lesson = json!({
        "title": "Enums",
        "summary": "Types with variants",
        "objectives": ["Define an enum"],
        "sections": [{ "heading": "Variants", "body": "An enum lists its variants." }]
    });
    let assessment = json!({
        "questions": [
            { "prompt": "Which keyword defines an enum?", "choices": ["enum", "struct"], "answer_index": 0, "concept": "Variants" },
            { "prompt": "Which construct matches variants?", "choices": ["if", "match"], "answer_index": 1, "concept": "Pattern matching" }
        ]
    });
    let weak = json!({ "concepts": ["Pattern matching"] });
    let capstone = json!({
        "scores": [
            { "criterion": "Functionality", "score": 8, "feedback": "Works" },
            { "criterion": "Code Quality", "score": 7 },
            { "criterion": "Concept Application", "score": 8 },
            { "criterion": "Documentation", "score": 6 }
        ],
        "summary": "Solid first project"
    });

    let (app, provider) = app(ScriptedProvider::new([
        "Let's build a todo CLI.".to_string(),
        suggestions.to_string(),
        summary.to_string(),
        graph.to_string(),
        lesson.to_string(),
        assessment.to_string(),
        weak.to_string(),
        capstone.to_string(),
    ]));
    let sid = "learner-1";

    call(&app, chat(sid, "I want to learn Rust", Some("r1"))).await;
    assert_eq!(settled_messages(&app, sid).await.len(), 2);

    // Suggestions
    let (status, body) = call(
        &app,
        send("POST", "/api/suggest-projects", json!({ "session_id": sid, "interests": ["cli"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"][0]["title"], "Todo CLI");
    let (_, body) = call(&app, get(&format!("/api/suggest-projects?session_id={sid}"))).await;
    assert_eq!(body["projects"].as_array().unwrap().len(), 1);

    // Summary and skill graph
    let (status, body) = call(&app, send("POST", &format!("/api/projects/{sid}"), json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["job"]["kind"], "graph");
    let job = wait_for_job(&app, sid).await;
    assert_eq!(job["state"], "complete", "job failed: {job}");

    let (status, body) = call(&app, get(&format!("/api/projects/{sid}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agreed_project"]["title"], "Todo CLI");

    let (status, body) = call(
        &app,
        send("PATCH", &format!("/api/projects/{sid}"), json!({ "topics": ["CLI", "Testing"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topics"], json!(["CLI", "Testing"]));
    assert_eq!(body["skills"], json!(["Argument parsing"]));

    let (_, graph_view) = call(&app, get(&format!("/api/graph?session_id={sid}"))).await;
    assert_eq!(graph_view["nodes"].as_array().unwrap().len(), 4);
    assert_eq!(graph_view["edges"].as_array().unwrap().len(), 3);

    let (_, stats) = call(&app, get(&format!("/api/graph/stats?session_id={sid}"))).await;
    assert_eq!(stats["node_count"], 4);
    assert_eq!(stats["nodes_by_label"]["Concept"], 2);

    let (status, path) = call(&app, get(&format!("/api/graph/path?session_id={sid}"))).await;
    assert_eq!(status, StatusCode::OK);
    let order: Vec<&str> = path["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(order, vec!["Enums", "Ownership", "Argument parsing", "Todo CLI"]);
    assert_eq!(path["next"].as_array().unwrap().len(), 2);

    // Lesson
    let enums_id = node_named(&graph_view, "Enums")["id"].as_str().unwrap().to_string();
    let lesson_uri = format!("/api/nodes/{enums_id}/lesson?session_id={sid}");
    let (status, _) = call(&app, get(&lesson_uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = call(&app, send("POST", &lesson_uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Enums");
    let (_, body) = call(&app, get(&lesson_uri)).await;
    assert_eq!(body["sections"][0]["heading"], "Variants");

    // Assessment: the answer key never leaves the server.
    let assessment_uri = format!("/api/nodes/{enums_id}/assessment?session_id={sid}");
    let (status, body) = call(&app, send("POST", &assessment_uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["questions"].as_array().unwrap().len(), 2);
    assert!(body["questions"][0].get("answer_index").is_none());

    let submit_uri = format!("/api/nodes/{enums_id}/assessment/submit?session_id={sid}");
    let (status, _) = call(&app, send("POST", &submit_uri, json!({ "answers": [0] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, result) = call(&app, send("POST", &submit_uri, json!({ "answers": [0, 0] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["passed"], false);
    assert_eq!(result["correct"], 1);
    assert_eq!(result["remedial_nodes"][0]["name"], "Pattern matching");
    assert_eq!(result["remedial_nodes"][0]["remedial"], true);

    let (_, graph_view) = call(&app, get(&format!("/api/graph?session_id={sid}"))).await;
    assert_eq!(graph_view["nodes"].as_array().unwrap().len(), 5);
    let enums = node_named(&graph_view, "Enums");
    assert_eq!(enums["properties"]["status"], "in_progress");
    assert_eq!(enums["properties"]["mastery"], 0.5);
    let (_, path) = call(&app, get(&format!("/api/graph/path?session_id={sid}"))).await;
    let order: Vec<&str> = path["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
    assert!(position("Pattern matching") < position("Enums"));

    let (_, result) = call(&app, send("POST", &submit_uri, json!({ "answers": [0, 1] }))).await;
    assert_eq!(result["passed"], true);
    assert_eq!(result["score"], 1.0);
    let (_, graph_view) = call(&app, get(&format!("/api/graph?session_id={sid}"))).await;
    assert_eq!(node_named(&graph_view, "Enums")["properties"]["status"], "mastered");

    // Capstone
    let (status, body) = call(
        &app,
        send(
            "POST",
            &format!("/api/capstone/{sid}"),
            json!({ "title": "Todo CLI", "description": "Adds, lists, and completes tasks" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
    assert!((body["overall"].as_f64().unwrap() - 7.45).abs() < 1e-9);

    assert_eq!(provider.remaining(), 0);

    // Delete
    let (status, body) = call(&app, send("DELETE", &format!("/api/projects/{sid}"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_nodes"], 5);
    assert_eq!(body["summary_deleted"], true);
    let (status, _) = call(&app, get(&format!("/api/projects/{sid}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = call(&app, get(&format!("/api/suggest-projects?session_id={sid}"))).await;
    assert!(body["projects"].as_array().unwrap().is_empty());
}
