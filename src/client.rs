//! Completion client
//!
//! [`CompletionClient`] is the entry point. It resolves the credential,
//! checks the host's streaming capability, and runs one of three paths:
//!
//! - [`stream`](CompletionClient::stream): a raw streaming session.
//! - [`run_blocking`](CompletionClient::run_blocking): a single-shot request.
//! - [`run_exchange`](CompletionClient::run_exchange): proxy first, then
//!   streaming with a single blocking fallback when the stream is empty or
//!   fails.
//!
//! Callers must cancel a running exchange before starting the next one on
//! the same message; the client does not track exchanges across calls.

use crate::config::ClientConfig;
use crate::error::{ClassifiedError, LlmError, classify};
use crate::exchange::{ExchangeOptions, ExchangeOutcome, FallbackReason, MessageAccumulator};
use crate::platform::supports_streaming;
use crate::storage::{KeyValueStore, load_api_key};
use crate::streaming::{
    SessionControl, SessionOptions, SessionOutcome, StreamHandle, StreamObserver, StreamSession,
};
use crate::transport::{ChatTransport, HttpTransport, ProxyTransport};
use crate::types::ChatRequest;
use secrecy::SecretString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Streaming-first chat-completion client. Cheap to clone.
#[derive(Clone)]
pub struct CompletionClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn ChatTransport>,
    proxy: Option<Arc<dyn ProxyTransport>>,
    settings: Option<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("base_url", &self.inner.config.base_url)
            .field("has_proxy", &self.inner.proxy.is_some())
            .field("has_settings_store", &self.inner.settings.is_some())
            .finish()
    }
}

impl CompletionClient {
    pub fn builder() -> CompletionClientBuilder {
        CompletionClientBuilder::default()
    }

    /// Client over the default HTTP transport.
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Credential for the next request, if any.
    pub fn credential(&self) -> Option<SecretString> {
        self.inner.credential()
    }

    pub fn streaming_supported(&self) -> bool {
        self.inner.streaming_supported()
    }

    /// Start a raw streaming session.
    ///
    /// Preconditions are checked synchronously: without a credential or on a
    /// host below the minimum platform version no request is made and the
    /// classified error is returned. Must be called within a Tokio runtime.
    pub fn stream<O>(&self, body: &ChatRequest, observer: O) -> Result<StreamHandle, ClassifiedError>
    where
        O: StreamObserver,
    {
        let Some(credential) = self.inner.credential() else {
            tracing::warn!("streaming request without credential");
            return Err(classify(LlmError::MissingApiKey));
        };
        if !self.inner.streaming_supported() {
            let error = LlmError::UnsupportedPlatform {
                version: self.inner.platform_version().to_string(),
                minimum: self.inner.config.min_platform_version.clone(),
            };
            tracing::warn!(error = %error, "streaming not supported by host");
            return Err(classify(error));
        }

        Ok(StreamSession::start(
            self.inner.transport.clone(),
            body,
            credential,
            observer,
            self.inner.session_options(),
            None,
        ))
    }

    /// Single-shot completion: proxy first, then the direct transport with
    /// `stream` forced off.
    pub async fn run_blocking(&self, body: &ChatRequest) -> Result<String, ClassifiedError> {
        if let Some(content) = self.inner.try_proxy(body).await {
            return Ok(content);
        }
        let Some(credential) = self.inner.credential() else {
            return Err(classify(LlmError::MissingApiKey));
        };
        self.inner.blocking(body, &credential).await
    }

    /// Run one chat exchange into `accumulator`.
    ///
    /// Streamed deltas go to [`MessageAccumulator::on_delta`]; the final text
    /// (terminal flush, fallback result or proxy payload) goes to
    /// [`MessageAccumulator::on_final`]. After [`ExchangeHandle::cancel`]
    /// returns, neither is called again. Must be called within a Tokio
    /// runtime.
    pub fn run_exchange<A>(
        &self,
        body: &ChatRequest,
        accumulator: A,
        options: ExchangeOptions,
    ) -> ExchangeHandle
    where
        A: MessageAccumulator,
    {
        let shared = Arc::new(ExchangeShared::default());

        // Without a proxy the credential check needs no suspension point.
        if self.inner.proxy.is_none() && self.inner.credential().is_none() {
            tracing::warn!("exchange rejected: no credential");
            return ExchangeHandle {
                shared,
                state: HandleState::Ready(Err(classify(LlmError::MissingApiKey))),
            };
        }

        let inner = self.inner.clone();
        let body = body.clone();
        let accumulator = Arc::new(accumulator);
        let task_shared = shared.clone();
        let span = tracing::info_span!("exchange", model = %body.model, stream = options.stream);

        let task = tokio::spawn(
            async move {
                let token = task_shared.token.clone();
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => Ok(ExchangeOutcome::Cancelled),
                    result = inner.exchange(&body, accumulator, options, &task_shared) => result,
                };
                match &result {
                    Ok(outcome) => tracing::info!(outcome = outcome_name(outcome), "exchange finished"),
                    Err(error) => tracing::error!(kind = %error.kind, raw = %error.raw_message, "exchange failed"),
                }
                result
            }
            .instrument(span),
        );

        ExchangeHandle {
            shared,
            state: HandleState::Running(task),
        }
    }
}

fn outcome_name(outcome: &ExchangeOutcome) -> &'static str {
    match outcome {
        ExchangeOutcome::Streamed { .. } => "streamed",
        ExchangeOutcome::Fallback { .. } => "fallback",
        ExchangeOutcome::Proxied { .. } => "proxied",
        ExchangeOutcome::Cancelled => "cancelled",
    }
}

impl ClientInner {
    fn credential(&self) -> Option<SecretString> {
        let stored = self
            .settings
            .as_ref()
            .and_then(|store| load_api_key(store.as_ref()));
        self.config.resolve_api_key(stored.as_deref())
    }

    fn platform_version(&self) -> &str {
        self.config
            .platform_version
            .as_deref()
            .unwrap_or(&self.config.min_platform_version)
    }

    fn streaming_supported(&self) -> bool {
        supports_streaming(
            self.config.platform_version.as_deref(),
            &self.config.min_platform_version,
        )
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            idle_timeout: self.config.stream_timeout,
        }
    }

    /// Proxy payload text, or `None` to fall through to the direct path.
    async fn try_proxy(&self, body: &ChatRequest) -> Option<String> {
        let proxy = self.proxy.as_ref()?;
        tracing::debug!("trying proxy transport");
        let completion = proxy.forward(&body.with_stream(false)).await?;
        match completion.content_text() {
            Some(content) => {
                tracing::info!(response_length = content.len(), "proxy returned a payload");
                Some(content.to_string())
            }
            None => {
                tracing::debug!("proxy payload has no content, using direct transport");
                None
            }
        }
    }

    async fn blocking(
        &self,
        body: &ChatRequest,
        credential: &SecretString,
    ) -> Result<String, ClassifiedError> {
        let body = body.with_stream(false);
        let limit = self.config.blocking_timeout;
        let completion = match tokio::time::timeout(limit, self.transport.complete(&body, credential)).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => return Err(classify(&e)),
            Err(_) => {
                return Err(classify(LlmError::TimeoutError(format!(
                    "网络请求超时 ({}s)",
                    limit.as_secs()
                ))));
            }
        };
        completion
            .content_text()
            .map(str::to_string)
            .ok_or_else(|| classify(LlmError::ParseError("API返回数据格式错误".to_string())))
    }

    async fn exchange<A>(
        &self,
        body: &ChatRequest,
        accumulator: Arc<A>,
        options: ExchangeOptions,
        shared: &ExchangeShared,
    ) -> Result<ExchangeOutcome, ClassifiedError>
    where
        A: MessageAccumulator,
    {
        if let Some(content) = self.try_proxy(body).await {
            return Ok(if shared.deliver_final(accumulator.as_ref(), &content) {
                ExchangeOutcome::Proxied { content }
            } else {
                ExchangeOutcome::Cancelled
            });
        }

        let Some(credential) = self.credential() else {
            return Err(classify(LlmError::MissingApiKey));
        };

        let reason = if options.stream && self.streaming_supported() {
            let handle = StreamSession::start_with(
                self.transport.clone(),
                body,
                credential.clone(),
                Forward {
                    accumulator: accumulator.clone(),
                },
                self.session_options(),
                Some(&shared.token),
                |control| shared.attach(control.clone()),
            );

            match handle.wait().await {
                SessionOutcome::Completed {
                    content, deltas, ..
                } if deltas > 0 => {
                    return Ok(if shared.deliver_final(accumulator.as_ref(), &content) {
                        ExchangeOutcome::Streamed { content, deltas }
                    } else {
                        ExchangeOutcome::Cancelled
                    });
                }
                SessionOutcome::Completed { malformed, .. } => {
                    tracing::warn!(malformed, "stream completed without content, falling back");
                    FallbackReason::EmptyStream
                }
                SessionOutcome::Failed { error, deltas, .. } => {
                    tracing::warn!(kind = %error.kind, deltas, "stream failed, falling back");
                    FallbackReason::StreamFailed(error)
                }
                // Never conflated with an empty stream.
                SessionOutcome::Aborted { .. } => return Ok(ExchangeOutcome::Cancelled),
            }
        } else {
            tracing::info!(
                requested = options.stream,
                platform = self.platform_version(),
                "using blocking request"
            );
            FallbackReason::StreamingUnsupported
        };

        if shared.is_cancelled() {
            return Ok(ExchangeOutcome::Cancelled);
        }
        let content = self.blocking(body, &credential).await?;
        Ok(if shared.deliver_final(accumulator.as_ref(), &content) {
            ExchangeOutcome::Fallback { content, reason }
        } else {
            ExchangeOutcome::Cancelled
        })
    }
}

/// Forwards session deltas to the accumulator.
struct Forward<A> {
    accumulator: Arc<A>,
}

impl<A: MessageAccumulator> StreamObserver for Forward<A> {
    fn on_message(&mut self, delta: &str) {
        self.accumulator.on_delta(delta);
    }
}

#[derive(Default)]
struct ExchangeShared {
    /// Guards the final write against a concurrent cancel.
    cancelled: Mutex<bool>,
    token: CancellationToken,
    session: Mutex<Option<SessionControl>>,
}

impl ExchangeShared {
    fn cancelled(&self) -> MutexGuard<'_, bool> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled()
    }

    /// Register the session before its driver runs.
    ///
    /// A cancel that raced ahead of registration is applied here, so the
    /// driver never emits once `cancel()` has returned.
    fn attach(&self, control: SessionControl) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(control.clone());
        if self.is_cancelled() {
            control.cancel();
        }
    }

    fn deliver_final(&self, accumulator: &dyn MessageAccumulator, content: &str) -> bool {
        let cancelled = self.cancelled();
        if *cancelled {
            return false;
        }
        accumulator.on_final(content);
        true
    }

    fn cancel(&self) {
        *self.cancelled() = true;
        self.token.cancel();
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        // Waits for an in-flight delta to finish before returning.
        if let Some(session) = session {
            session.cancel();
        }
    }
}

enum HandleState {
    Ready(Result<ExchangeOutcome, ClassifiedError>),
    Running(JoinHandle<Result<ExchangeOutcome, ClassifiedError>>),
}

/// Caller-owned handle to a running exchange.
///
/// Dropping the handle does not cancel the exchange.
pub struct ExchangeHandle {
    shared: Arc<ExchangeShared>,
    state: HandleState,
}

impl std::fmt::Debug for ExchangeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeHandle")
            .field("cancelled", &self.shared.is_cancelled())
            .field("ready", &matches!(self.state, HandleState::Ready(_)))
            .finish()
    }
}

impl ExchangeHandle {
    /// Stop the exchange. Synchronous and idempotent.
    pub fn cancel(&self) {
        if !self.shared.is_cancelled() {
            tracing::info!("exchange cancelled");
        }
        self.shared.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// The error of an exchange rejected before any I/O, if any.
    pub fn rejection(&self) -> Option<&ClassifiedError> {
        match &self.state {
            HandleState::Ready(Err(error)) => Some(error),
            _ => None,
        }
    }

    pub async fn wait(self) -> Result<ExchangeOutcome, ClassifiedError> {
        match self.state {
            HandleState::Ready(result) => result,
            HandleState::Running(task) => match task.await {
                Ok(result) => result,
                Err(e) => Err(classify(LlmError::InternalError(format!(
                    "exchange task ended abnormally: {e}"
                )))),
            },
        }
    }
}

/// Builder for [`CompletionClient`].
#[derive(Default)]
pub struct CompletionClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn ChatTransport>>,
    proxy: Option<Arc<dyn ProxyTransport>>,
    settings: Option<Arc<dyn KeyValueStore>>,
    http_client: Option<reqwest::Client>,
}

impl CompletionClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config = self.config.with_api_key(api_key);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config = self.config.with_base_url(base_url);
        self
    }

    /// Version reported by the host runtime.
    pub fn platform_version(mut self, version: impl Into<String>) -> Self {
        self.config = self.config.with_platform_version(version);
        self
    }

    /// Replace the default HTTP transport.
    pub fn transport(mut self, transport: impl ChatTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn proxy(mut self, proxy: impl ProxyTransport + 'static) -> Self {
        self.proxy = Some(Arc::new(proxy));
        self
    }

    /// Read the credential from stored settings on every request.
    pub fn settings_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.settings = Some(store);
        self
    }

    /// Reuse an existing `reqwest::Client` for the default transport.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<CompletionClient, LlmError> {
        let transport: Arc<dyn ChatTransport> = match (self.transport, self.http_client) {
            (Some(transport), _) => transport,
            (None, Some(client)) => Arc::new(HttpTransport::with_client(client, &self.config)),
            (None, None) => Arc::new(HttpTransport::new(&self.config)?),
        };

        tracing::debug!(
            base_url = %self.config.base_url,
            has_proxy = self.proxy.is_some(),
            platform = ?self.config.platform_version,
            "completion client built"
        );

        Ok(CompletionClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                transport,
                proxy: self.proxy,
                settings: self.settings,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::{MemoryStore, save_settings};
    use crate::config::Settings;
    use secrecy::ExposeSecret;

    fn client(config: ClientConfig) -> CompletionClient {
        CompletionClient::builder().config(config).build().unwrap()
    }

    #[test]
    fn stored_credential_wins_over_config() {
        let store = Arc::new(MemoryStore::new());
        save_settings(
            store.as_ref(),
            &Settings {
                api_key: " sk-stored ".into(),
                ..Settings::default()
            },
        );
        let client = CompletionClient::builder()
            .api_key("sk-config")
            .settings_store(store)
            .build()
            .unwrap();
        assert_eq!(client.credential().unwrap().expose_secret(), "sk-stored");
    }

    #[test]
    fn stored_credential_survives_unreadable_sibling_fields() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                crate::storage::SETTINGS_KEY,
                serde_json::json!({
                    "deepseekApiKey": "sk-valid",
                    "contextSize": 10,
                    "temperature": null
                }),
            )
            .unwrap();
        let client = CompletionClient::builder()
            .config(ClientConfig::new().with_env_credential(false))
            .settings_store(store)
            .build()
            .unwrap();
        assert_eq!(client.credential().unwrap().expose_secret(), "sk-valid");
    }

    #[tokio::test]
    async fn session_attached_after_cancel_is_aborted_immediately() {
        let shared = ExchangeShared::default();
        shared.cancel();

        let transport: Arc<dyn ChatTransport> = Arc::new(
            HttpTransport::new(&ClientConfig::new().with_base_url("http://127.0.0.1:9")).unwrap(),
        );
        let handle = StreamSession::start_with(
            transport,
            &ChatRequest::new("deepseek-chat"),
            SecretString::from("sk-test".to_string()),
            crate::streaming::StreamCallbacks::new()
                .on_message(|delta| panic!("delta after cancel: {delta}")),
            SessionOptions::default(),
            None,
            |control| shared.attach(control.clone()),
        );

        assert_eq!(handle.state(), crate::streaming::SessionState::Aborted);
        assert!(matches!(handle.wait().await, SessionOutcome::Aborted { .. }));
    }

    #[test]
    fn platform_gate_uses_configured_version() {
        let old = client(ClientConfig::new().with_platform_version("2.30.0"));
        assert!(!old.streaming_supported());
        let unknown = client(ClientConfig::new());
        assert!(unknown.streaming_supported());
    }

    #[tokio::test]
    async fn stream_rejects_old_platform_synchronously() {
        let client = client(
            ClientConfig::new()
                .with_api_key("sk-test")
                .with_platform_version("2.30.0"),
        );
        let err = client
            .stream(&ChatRequest::new("deepseek-chat"), crate::streaming::StreamCallbacks::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedPlatform);
    }
}
