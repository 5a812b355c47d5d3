//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use parley_chat::{ChatBot, ExchangeLog};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Runs exchanges; one pipeline per request.
    pub chatbot: Arc<ChatBot>,
    /// Process-wide exchange log, also read by `/exchanges/last`.
    pub exchange_log: Arc<ExchangeLog>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(chatbot: ChatBot, exchange_log: Arc<ExchangeLog>) -> Self {
        Self {
            chatbot: Arc::new(chatbot),
            exchange_log,
            start_time: Instant::now(),
        }
    }
}
