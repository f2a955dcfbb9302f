//! reqwest-backed transport.

use super::{ByteStream, ChatTransport};
use crate::config::ClientConfig;
use crate::error::LlmError;
use crate::error::http::error_from_status;
use crate::observability::mask_sensitive_value;
use crate::types::{ChatCompletion, ChatRequest};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};

/// Direct HTTP transport to an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    blocking_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    pub fn new(config: &ClientConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| LlmError::ConfigurationError(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            url: config.completions_url(),
            blocking_timeout: config.blocking_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(
        &self,
        body: &ChatRequest,
        credential: &SecretString,
    ) -> Result<reqwest::Response, LlmError> {
        let token = credential.expose_secret();
        tracing::debug!(
            url = %self.url,
            authorization = %mask_sensitive_value(&format!("Bearer {token}")),
            "sending chat request"
        );

        let mut request = self.client.post(&self.url).bearer_auth(token).json(body);
        request = if body.stream {
            request
                .header(ACCEPT, "text/event-stream")
                .header(CACHE_CONTROL, "no-cache")
        } else {
            request.timeout(self.blocking_timeout)
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let error = error_from_status(status.as_u16(), &text);
        tracing::error!(status = status.as_u16(), error = %error, "chat request rejected");
        Err(error)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(
        &self,
        body: &ChatRequest,
        credential: &SecretString,
    ) -> Result<ChatCompletion, LlmError> {
        let started = Instant::now();
        tracing::info!(model = %body.model, messages = body.messages.len(), "blocking request started");

        let response = self.post(body, credential).await?;
        let text = response.text().await?;
        let completion: ChatCompletion = serde_json::from_str(&text)
            .map_err(|e| LlmError::ParseError(format!("API返回数据格式错误: {e}")))?;

        tracing::info!(
            duration_ms = started.elapsed().as_millis() as u64,
            response_length = text.len(),
            "blocking request completed"
        );
        Ok(completion)
    }

    async fn open_stream(
        &self,
        body: &ChatRequest,
        credential: &SecretString,
    ) -> Result<ByteStream, LlmError> {
        tracing::info!(model = %body.model, messages = body.messages.len(), "streaming request started");

        let response = self.post(body, credential).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(LlmError::from));
        Ok(Box::pin(stream))
    }
}
