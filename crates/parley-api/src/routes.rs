//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_core::error::ParleyError;

use crate::handlers;
use crate::state::AppState;

/// Maximum accepted request body (transcripts are small).
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/exchanges/last", get(handlers::last_exchange))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the given port.
///
/// Binds to 0.0.0.0 so browser frontends on other hosts can reach it.
pub async fn start_server(state: AppState, port: u16) -> Result<(), ParleyError> {
    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Api(format!("failed to bind {}: {}", addr, e)))?;
    tracing::info!("Parley API listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| ParleyError::Api(format!("server error: {}", e)))?;

    Ok(())
}
