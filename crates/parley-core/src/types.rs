use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form generation parameters forwarded to the backend untouched.
pub type Parameters = Map<String, Value>;

// =============================================================================
// Transcript
// =============================================================================

/// One utterance by one speaker.
///
/// Serialized as `{"sender": ..., "message": ...}`, the shape frontends send
/// and the exchange log records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(rename = "sender")]
    pub speaker: String,
    #[serde(rename = "message")]
    pub text: String,
}

impl Turn {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Intent of the latest user turn as reported by the classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub confidence: f64,
    /// The classifier's complete response, passed through opaquely.
    pub raw: Value,
}

// =============================================================================
// Generation
// =============================================================================

/// Body of the streaming generate call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(rename = "inputs")]
    pub prompt: String,
    pub parameters: Parameters,
}

/// One decoded unit of the upstream token protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenEvent {
    pub text: String,
    /// Heuristic end-of-utterance marker, not a protocol guarantee.
    pub is_stop_signal: bool,
}

// =============================================================================
// Exchange log
// =============================================================================

/// Everything known about an exchange before the reply streams in.
///
/// Turned into an [`ExchangeLogRecord`] exactly once via [`complete`].
///
/// [`complete`]: PendingExchange::complete
#[derive(Clone, Debug, PartialEq)]
pub struct PendingExchange {
    pub turns: Vec<Turn>,
    pub session_id: String,
    pub parameters: Parameters,
    /// Raw classifier response, `None` when classification failed.
    pub intent_result: Option<Value>,
    pub prompt: String,
    pub request_timestamp: DateTime<Local>,
}

impl PendingExchange {
    /// Attach the accumulated reply and seal the record.
    pub fn complete(self, response_text: String) -> ExchangeLogRecord {
        ExchangeLogRecord {
            turns: self.turns,
            session_id: self.session_id,
            parameters: self.parameters,
            intent_result: self.intent_result,
            prompt: self.prompt,
            request_timestamp: self.request_timestamp,
            response_text,
        }
    }
}

/// One persisted line of the exchange log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExchangeLogRecord {
    #[serde(rename = "messages")]
    pub turns: Vec<Turn>,
    pub session_id: String,
    #[serde(rename = "llm_parameters")]
    pub parameters: Parameters,
    #[serde(rename = "nlu_response")]
    pub intent_result: Option<Value>,
    pub prompt: String,
    #[serde(rename = "time")]
    pub request_timestamp: DateTime<Local>,
    #[serde(rename = "llm_response")]
    pub response_text: String,
}
