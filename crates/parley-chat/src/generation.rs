//! Client for the streaming text-generation backend.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;

use parley_core::config::GenerationConfig;
use parley_core::types::GenerationRequest;

use crate::error::{ConnectionError, StreamError};

/// Raw upstream chunks, exactly as the transport delivered them.
pub type ChunkStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// A backend that streams generated text for a prompt.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Open the response stream. Returns once response headers arrived.
    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, ConnectionError>;
}

#[derive(Debug, Clone)]
struct BasicAuth {
    username: String,
    password: Option<String>,
}

/// HTTP client for a text-generation-inference style `generate_stream` endpoint.
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    http: Client,
    url: String,
    auth: Option<BasicAuth>,
}

impl HttpGenerationClient {
    /// Create a client without authentication.
    ///
    /// Only the connect phase is bounded here; the response body is an
    /// open-ended stream whose idle time is bounded by the pipeline.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Result<Self, ConnectionError> {
        let http = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            auth: None,
        })
    }

    /// Send HTTP basic auth with every request.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.into(),
            password,
        });
        self
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, ConnectionError> {
        if config.url.trim().is_empty() {
            return Err(ConnectionError::InvalidConfig(
                "generation url is empty".to_string(),
            ));
        }
        let client = Self::new(config.url.clone(), config.connect_timeout())?;
        match (&config.username, &config.password) {
            (Some(user), password) => Ok(client.with_basic_auth(user.clone(), password.clone())),
            (None, Some(_)) => Err(ConnectionError::InvalidConfig(
                "generation password set without a username".to_string(),
            )),
            (None, None) => Ok(client),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationClient {
    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, ConnectionError> {
        let mut builder = self.http.post(&self.url).json(request);
        if let Some(auth) = &self.auth {
            builder = builder.basic_auth(&auth.username, auth.password.as_ref());
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamError::Transport))
            .boxed())
    }
}
