//! Exchange orchestrator: classify -> prompt -> stream -> log.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};

use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;
use parley_core::types::{GenerationRequest, Parameters, PendingExchange, Turn};

use crate::classifier::{IntentClassifier, RasaClassifier};
use crate::error::ChatError;
use crate::generation::{GenerationBackend, HttpGenerationClient};
use crate::log_writer::ExchangeSink;
use crate::pipeline::{ResponseStream, StreamingPipeline};
use crate::strategy::build_prompt;

/// Runs exchanges end to end.
///
/// Shared across requests; every call to [`get_answer`](ChatBot::get_answer)
/// gets its own pipeline instance.
#[derive(Clone)]
pub struct ChatBot {
    classifier: Arc<dyn IntentClassifier>,
    pipeline: StreamingPipeline,
}

impl ChatBot {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn ExchangeSink>,
    ) -> Self {
        Self {
            classifier,
            pipeline: StreamingPipeline::new(backend, sink),
        }
    }

    /// Build the HTTP-backed bot described by `config`.
    pub fn from_config(
        config: &ParleyConfig,
        sink: Arc<dyn ExchangeSink>,
    ) -> Result<Self, ParleyError> {
        let classifier = RasaClassifier::from_config(&config.classifier)
            .map_err(|e| ParleyError::Config(format!("classifier client: {}", e)))?;
        let backend = HttpGenerationClient::from_config(&config.generation)
            .map_err(|e| ParleyError::Config(format!("generation client: {}", e)))?;

        Ok(Self::new(Arc::new(classifier), Arc::new(backend), sink)
            .with_chunk_timeout(config.generation.chunk_timeout()))
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline = self.pipeline.with_chunk_timeout(timeout);
        self
    }

    /// Run one exchange and return the reply stream.
    ///
    /// Classification failure is not fatal: the exchange continues without
    /// an intent and the default prompt strategy applies. Errors returned
    /// here happen before any byte is streamed.
    pub async fn get_answer(
        &self,
        turns: Vec<Turn>,
        session_id: impl Into<String>,
        parameters: Parameters,
    ) -> Result<ResponseStream, ChatError> {
        let session_id = session_id.into();
        let latest = turns
            .last()
            .ok_or_else(|| ChatError::InvalidInput("transcript is empty".to_string()))?;

        let intent = match self.classifier.classify(&latest.text).await {
            Ok(intent) => {
                info!(
                    session_id = %session_id,
                    intent = %intent.name,
                    confidence = intent.confidence,
                    "Intent classified"
                );
                Some(intent)
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Intent classification failed; using default strategy");
                None
            }
        };

        let prompt = build_prompt(&turns, intent.as_ref(), &session_id)?;

        let pending = PendingExchange {
            turns,
            session_id,
            parameters: parameters.clone(),
            intent_result: intent.map(|i| i.raw),
            prompt: prompt.clone(),
            request_timestamp: Local::now(),
        };
        let request = GenerationRequest { prompt, parameters };

        Ok(self.pipeline.start(request, pending).await?)
    }
}

impl std::fmt::Debug for ChatBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBot")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
