//! HTTP request handlers for all API endpoints.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use parley_core::types::{ExchangeLogRecord, Parameters, Turn};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the session id used for the exchange.
pub const SESSION_HEADER: &str = "x-session-id";

// =============================================================================
// Chat endpoint
// =============================================================================

/// Request body for POST /chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Transcript, oldest turn first.
    pub messages: Vec<Turn>,
    /// Caller-supplied session id; generated when absent.
    pub session_id: Option<String>,
    /// Passed through to the generation service untouched.
    #[serde(default)]
    pub llm_parameters: Parameters,
}

/// POST /chat - run one exchange and stream the raw reply chunks.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(session_id = %session_id, turns = req.messages.len(), "Chat request");

    let stream = state
        .chatbot
        .get_answer(req.messages, session_id.clone(), req.llm_parameters)
        .await?;

    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream".to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (header::HeaderName::from_static(SESSION_HEADER), session_id),
        ],
        body,
    )
        .into_response())
}

// =============================================================================
// Exchange log
// =============================================================================

/// GET /exchanges/last - most recently persisted exchange record.
pub async fn last_exchange(
    State(state): State<AppState>,
) -> Result<Json<ExchangeLogRecord>, ApiError> {
    state
        .exchange_log
        .last_record()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no exchange has been logged yet".to_string()))
}

// =============================================================================
// Health
// =============================================================================

/// Response body for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
