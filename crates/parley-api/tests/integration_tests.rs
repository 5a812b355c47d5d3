//! Router tests for the Parley API with in-process fake backends.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use parley_api::create_router;
use parley_api::handlers::HealthResponse;
use parley_api::state::AppState;
use parley_chat::{
    ChatBot, ChunkStream, ClassificationError, ConnectionError, ExchangeLog, GenerationBackend,
    IntentClassifier,
};
use parley_core::types::{GenerationRequest, Intent};

// =============================================================================
// Helpers
// =============================================================================

const CHUNKS: [&str; 3] = [
    "data: {\"token\":{\"text\":\"It's\"}}\n",
    "data: {\"token\":{\"text\":\" fake.\"}}\n",
    "data: {\"token\":{\"text\":\"\\n\"}}\n",
];

struct FixedClassifier;

#[async_trait]
impl IntentClassifier for FixedClassifier {
    async fn classify(&self, _utterance: &str) -> Result<Intent, ClassificationError> {
        Ok(Intent {
            name: "greet".to_string(),
            confidence: 0.8,
            raw: json!({"intent": {"name": "greet", "confidence": 0.8}}),
        })
    }
}

/// Replays `CHUNKS` and remembers the last request.
#[derive(Default)]
struct ScriptedBackend {
    seen: Mutex<Option<GenerationRequest>>,
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, ConnectionError> {
        *self.seen.lock().unwrap() = Some(request.clone());
        let chunks: Vec<_> = CHUNKS
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

struct RefusingBackend;

#[async_trait]
impl GenerationBackend for RefusingBackend {
    async fn open(&self, _request: &GenerationRequest) -> Result<ChunkStream, ConnectionError> {
        Err(ConnectionError::Status {
            status: 503,
            body: "loading".to_string(),
        })
    }
}

struct Harness {
    app: axum::Router,
    backend: Arc<ScriptedBackend>,
    log: Arc<ExchangeLog>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(ExchangeLog::new(dir.path().join("chat_log.text")));
    let backend = Arc::new(ScriptedBackend::default());
    let bot = ChatBot::new(Arc::new(FixedClassifier), backend.clone(), log.clone());
    let app = create_router(AppState::new(bot, log.clone()));
    Harness {
        app,
        backend,
        log,
        _dir: dir,
    }
}

fn refusing_app() -> (axum::Router, Arc<ExchangeLog>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(ExchangeLog::new(dir.path().join("chat_log.text")));
    let bot = ChatBot::new(Arc::new(FixedClassifier), Arc::new(RefusingBackend), log.clone());
    (create_router(AppState::new(bot, log.clone())), log, dir)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Bytes {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap()
}

fn chat_body() -> Value {
    json!({
        "messages": [
            {"sender": "user", "message": "Hi"},
            {"sender": "bot", "message": "Hello"},
            {"sender": "user", "message": "Is it real?"}
        ],
        "session_id": "abc",
        "llm_parameters": {"max_new_tokens": 20}
    })
}

// =============================================================================
// POST /chat
// =============================================================================

#[tokio::test]
async fn test_chat_streams_raw_chunks_and_logs() {
    let h = harness();
    let resp = h.app.clone().oneshot(post_json("/chat", chat_body())).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["x-session-id"], "abc");

    let body = body_bytes(resp).await;
    assert_eq!(body, Bytes::from(CHUNKS.concat()));

    let record = h.log.last_record().unwrap();
    assert_eq!(record.session_id, "abc");
    assert_eq!(record.response_text, "It's fake.\n");
    assert_eq!(record.parameters["max_new_tokens"], 20);

    let seen = h.backend.seen.lock().unwrap().clone().unwrap();
    assert!(seen.prompt.ends_with("user: Is it real?\nuser: "));
}

#[tokio::test]
async fn test_chat_generates_session_id_when_missing() {
    let h = harness();
    let body = json!({"messages": [{"sender": "user", "message": "Hi"}]});
    let resp = h.app.clone().oneshot(post_json("/chat", body)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let session = resp.headers()["x-session-id"].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&session).is_ok());

    let _ = body_bytes(resp).await;
    assert_eq!(h.log.last_record().unwrap().session_id, session);
}

#[tokio::test]
async fn test_chat_empty_transcript_is_bad_request() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(post_json("/chat", json!({"messages": []})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body["error"], "bad_request");
    assert!(h.backend.seen.lock().unwrap().is_none());
    assert!(h.log.last_record().is_none());
}

#[tokio::test]
async fn test_chat_upstream_failure_is_bad_gateway() {
    let (app, log, _dir) = refusing_app();
    let resp = app.oneshot(post_json("/chat", chat_body())).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body["error"], "bad_gateway");
    assert!(body["message"].as_str().unwrap().contains("503"));
    assert!(log.last_record().is_none());
}

#[tokio::test]
async fn test_chat_rejects_malformed_json() {
    let h = harness();
    let req = Request::post("/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert!(resp.status().is_client_error());
    assert!(h.backend.seen.lock().unwrap().is_none());
}

// =============================================================================
// GET /exchanges/last
// =============================================================================

#[tokio::test]
async fn test_last_exchange_not_found_before_any_chat() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(Request::get("/exchanges/last").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_last_exchange_returns_wire_record() {
    let h = harness();
    let resp = h.app.clone().oneshot(post_json("/chat", chat_body())).await.unwrap();
    let _ = body_bytes(resp).await;

    let resp = h
        .app
        .clone()
        .oneshot(Request::get("/exchanges/last").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let record: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(record["session_id"], "abc");
    assert_eq!(record["llm_response"], "It's fake.\n");
    assert_eq!(record["nlu_response"]["intent"]["name"], "greet");
    assert_eq!(record["messages"][0]["sender"], "user");
}

// =============================================================================
// GET /health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_cors_preflight_allowed() {
    let h = harness();
    let req = Request::options("/chat")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert!(resp.headers().contains_key("access-control-allow-origin"));
}
