//! Integration tests for the Navi relay.
//!
//! Drives the full HTTP surface with a scripted completion gateway so
//! no network access is required.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use navi_relay::{
    build_router, AppState, CompletionGateway, ConversationRecord, ConversationSink, GatewayError,
    Message, NullSink, Role, SessionStore,
};

const BASE_PROMPT: &str = "You are a test assistant.";

/// Gateway that replays a scripted sequence of outcomes.
struct ScriptedGateway {
    outcomes: Mutex<VecDeque<Result<String, GatewayError>>>,
}

impl ScriptedGateway {
    fn new(outcomes: Vec<Result<String, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
        })
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _history: &[Message]) -> Result<String, GatewayError> {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::new("scripted", "script exhausted")))
    }
}

/// Sink that captures records for assertions.
struct RecordingSink {
    records: Mutex<Vec<ConversationRecord>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
        })
    }
}

impl ConversationSink for RecordingSink {
    fn record(&self, record: ConversationRecord) {
        self.records.lock().unwrap().push(record);
    }
}

fn test_state(gateway: Option<Arc<dyn CompletionGateway>>) -> (AppState, Arc<SessionStore>) {
    let store = Arc::new(SessionStore::new(BASE_PROMPT, Duration::from_secs(60)));
    let state = AppState {
        store: Arc::clone(&store),
        gateway,
        sink: Arc::new(NullSink),
        max_history: 20,
    };
    (state, store)
}

async fn post_prompt(app: &Router, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/prompt")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check_reports_healthy() {
    let (state, _store) = test_state(None);
    let app = build_router(state);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "healthy");
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_body_is_rejected_without_a_session() {
    let (state, store) = test_state(None);
    let app = build_router(state);

    let (status, body) = post_prompt(&app, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid request body"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn empty_session_id_is_rejected_without_a_session() {
    let gateway = ScriptedGateway::new(vec![Ok("unreachable".into())]);
    let (state, store) = test_state(Some(gateway));
    let app = build_router(state);

    let (status, body) =
        post_prompt(&app, &json!({"session_id": "", "prompt": "hi"}).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Session ID is required");
    assert!(store.is_empty());
}

#[tokio::test]
async fn empty_prompt_is_rejected_without_a_session() {
    let gateway = ScriptedGateway::new(vec![Ok("unreachable".into())]);
    let (state, store) = test_state(Some(gateway));
    let app = build_router(state);

    let (status, body) =
        post_prompt(&app, &json!({"session_id": "alice", "prompt": ""}).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["session_id"], "alice");
    assert_eq!(body["error"], "Prompt is required");
    assert!(store.is_empty());
}

#[tokio::test]
async fn non_post_prompt_is_method_not_allowed() {
    let (state, _store) = test_state(None);
    let app = build_router(state);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/prompt")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_credential_yields_config_error() {
    let (state, store) = test_state(None);
    let app = build_router(state);

    let (status, body) =
        post_prompt(&app, &json!({"session_id": "alice", "prompt": "hi"}).to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["session_id"], "alice");
    assert!(body["error"].as_str().unwrap().contains("Configuration error"));
    assert!(store.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation flow
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_prompt_appends_both_turns() {
    let gateway = ScriptedGateway::new(vec![Ok("hello there".into())]);
    let (state, store) = test_state(Some(gateway));
    let app = build_router(state);

    let (status, body) =
        post_prompt(&app, &json!({"session_id": "alice", "prompt": "hi"}).to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "alice");
    assert_eq!(body["response"], "hello there");
    assert!(body.get("error").is_none());

    let session = store.get("alice").unwrap();
    let history = session.history().await;
    let turns: Vec<(Role, &str)> = history
        .messages()
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Role::System, BASE_PROMPT),
            (Role::User, "hi"),
            (Role::Assistant, "hello there"),
        ]
    );
}

#[tokio::test]
async fn gateway_failure_keeps_the_orphaned_user_turn() {
    let gateway = ScriptedGateway::new(vec![Err(GatewayError::new("scripted", "upstream down")
        .with_status(503))]);
    let (state, store) = test_state(Some(gateway));
    let app = build_router(state);

    let (status, body) =
        post_prompt(&app, &json!({"session_id": "alice", "prompt": "hi"}).to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["session_id"], "alice");
    assert!(body["error"].as_str().unwrap().contains("upstream down"));
    assert!(body.get("response").is_none());

    let session = store.get("alice").unwrap();
    let history = session.history().await;
    let roles: Vec<Role> = history.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User]);
    assert_eq!(history.messages()[1].content, "hi");
}

#[tokio::test]
async fn two_sequential_prompts_build_an_ordered_history() {
    let gateway = ScriptedGateway::new(vec![Ok("first reply".into()), Ok("second reply".into())]);
    let (state, store) = test_state(Some(gateway));
    let app = build_router(state);

    let (status, _) = post_prompt(
        &app,
        &json!({"session_id": "alice", "prompt": "first question"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post_prompt(
        &app,
        &json!({"session_id": "alice", "prompt": "second question"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let session = store.get("alice").unwrap();
    let history = session.history().await;
    let turns: Vec<(Role, &str)> = history
        .messages()
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Role::System, BASE_PROMPT),
            (Role::User, "first question"),
            (Role::Assistant, "first reply"),
            (Role::User, "second question"),
            (Role::Assistant, "second reply"),
        ]
    );
}

#[tokio::test]
async fn sessions_are_isolated_by_id() {
    let gateway = ScriptedGateway::new(vec![Ok("for alice".into()), Ok("for bob".into())]);
    let (state, store) = test_state(Some(gateway));
    let app = build_router(state);

    post_prompt(&app, &json!({"session_id": "alice", "prompt": "hi"}).to_string()).await;
    post_prompt(&app, &json!({"session_id": "bob", "prompt": "hi"}).to_string()).await;

    assert_eq!(store.len(), 2);

    let alice = store.get("alice").unwrap();
    let history = alice.history().await;
    assert_eq!(history.messages()[2].content, "for alice");

    let bob = store.get("bob").unwrap();
    let history = bob.history().await;
    assert_eq!(history.messages()[2].content, "for bob");
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation records
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn records_are_emitted_for_success_and_failure() {
    let gateway = ScriptedGateway::new(vec![
        Ok("hello".into()),
        Err(GatewayError::new("scripted", "boom")),
    ]);
    let (mut state, _store) = test_state(Some(gateway));
    let sink = RecordingSink::new();
    state.sink = Arc::clone(&sink) as Arc<dyn ConversationSink>;
    let app = build_router(state);

    post_prompt(&app, &json!({"session_id": "alice", "prompt": "hi"}).to_string()).await;
    post_prompt(&app, &json!({"session_id": "alice", "prompt": "again"}).to_string()).await;

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0].session_id, "alice");
    assert_eq!(records[0].response.as_deref(), Some("hello"));
    assert!(records[0].error.is_none());

    assert_eq!(records[1].prompt, "again");
    assert!(records[1].response.is_none());
    assert!(records[1].error.as_deref().unwrap().contains("boom"));
}

#[tokio::test]
async fn validation_failures_emit_no_records() {
    let (mut state, _store) = test_state(None);
    let sink = RecordingSink::new();
    state.sink = Arc::clone(&sink) as Arc<dyn ConversationSink>;
    let app = build_router(state);

    post_prompt(&app, &json!({"session_id": "", "prompt": "hi"}).to_string()).await;
    post_prompt(&app, &json!({"session_id": "alice", "prompt": ""}).to_string()).await;

    assert!(sink.records.lock().unwrap().is_empty());
}
