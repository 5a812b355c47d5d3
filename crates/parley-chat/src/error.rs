//! Error types for the exchange pipeline.
//!
//! Only [`ChatError`] ever reaches the caller of an exchange. The others are
//! either absorbed into an explicit state (`ClassificationError` becomes an
//! absent intent) or confined to the operational log (`StreamError`,
//! `DecodeError`, `LogWriteError`).

use parley_core::error::ParleyError;

/// Failure reported synchronously to whoever started the exchange.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("generation service unavailable: {0}")]
    Connection(#[from] ConnectionError),
}

impl From<ChatError> for ParleyError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidInput(msg) => ParleyError::InvalidInput(msg),
            other => ParleyError::Api(other.to_string()),
        }
    }
}

/// The intent classifier could not produce an intent.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("classifier unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("classifier returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed classifier response: {0}")]
    Malformed(String),
    #[error("classifier response missing field `{0}`")]
    MissingField(&'static str),
}

/// The upstream generation stream could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream did not respond within {0:?}")]
    Timeout(std::time::Duration),
    #[error("invalid generation config: {0}")]
    InvalidConfig(String),
}

/// The upstream stream broke after it was opened.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("transport error mid-stream: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("no chunk received within {0:?}")]
    IdleTimeout(std::time::Duration),
}

/// A single line of the token protocol could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("line lacks the `data:` framing prefix")]
    MissingPrefix,
    #[error("invalid token record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
}

/// The exchange log could not persist a record.
#[derive(Debug, thiserror::Error)]
pub enum LogWriteError {
    #[error("log write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("log record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("log destination lock poisoned")]
    LockPoisoned,
}
