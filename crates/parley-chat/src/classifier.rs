//! Intent classifier client.
//!
//! Talks to a Rasa-style NLU parse endpoint: `POST {"text": ...}` returns
//! `{"intent": {"name": ..., "confidence": ...}, ...}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use parley_core::config::ClassifierConfig;
use parley_core::types::Intent;

use crate::error::ClassificationError;

/// Anything that can label an utterance with an intent.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, utterance: &str) -> Result<Intent, ClassificationError>;
}

/// HTTP client for a Rasa NLU `model/parse` endpoint.
#[derive(Debug, Clone)]
pub struct RasaClassifier {
    http: Client,
    url: String,
}

impl RasaClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.url.clone(), config.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IntentClassifier for RasaClassifier {
    async fn classify(&self, utterance: &str) -> Result<Intent, ClassificationError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "text": utterance }))
            .send()
            .await
            .map_err(ClassificationError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassificationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ClassificationError::Malformed(e.to_string()))?;

        parse_intent(raw)
    }
}

/// Extract the intent from a parse response, keeping the whole response as `raw`.
pub fn parse_intent(raw: Value) -> Result<Intent, ClassificationError> {
    let intent = raw
        .get("intent")
        .filter(|v| v.is_object())
        .ok_or(ClassificationError::MissingField("intent"))?;

    let name = intent
        .get("name")
        .and_then(Value::as_str)
        .ok_or(ClassificationError::MissingField("intent.name"))?
        .to_string();

    let confidence = intent
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or(ClassificationError::MissingField("intent.confidence"))?;

    Ok(Intent {
        name,
        confidence,
        raw,
    })
}
