//! Client configuration and persisted user settings.

use crate::types::{ChatMessage, ChatRequest};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Environment variable consulted when no credential is configured.
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Oldest host runtime version that delivers chunked responses.
pub const MIN_STREAMING_PLATFORM: &str = "2.31.0";

pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一只温柔的像素陪伴精灵。请用简短、温暖、口语化的中文回应用户，\
先共情再给出轻量、可执行的小建议；不说教，不评判，适当使用表情符号。";

/// Transport-level configuration of a [`CompletionClient`](crate::CompletionClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub chat_path: String,
    /// Static credential; overridden by a non-empty stored one.
    pub api_key: Option<SecretString>,
    /// Upper bound on the handshake and on the silence between two chunks.
    pub stream_timeout: Duration,
    /// Upper bound on a whole blocking request.
    pub blocking_timeout: Duration,
    pub connect_timeout: Duration,
    pub min_platform_version: String,
    /// Version reported by the host runtime. `None` is treated as the minimum.
    pub platform_version: Option<String>,
    pub user_agent: String,
    /// Fall back to `DEEPSEEK_API_KEY` when no other credential is set.
    pub env_credential: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_path: "/chat/completions".to_string(),
            api_key: None,
            stream_timeout: Duration::from_secs(60),
            blocking_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            min_platform_version: MIN_STREAMING_PLATFORM.to_string(),
            platform_version: None,
            user_agent: concat!("sprite-completion/", env!("CARGO_PKG_VERSION")).to_string(),
            env_credential: true,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = non_blank(api_key.into()).map(SecretString::from);
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_platform_version(mut self, version: impl Into<String>) -> Self {
        self.platform_version = Some(version.into());
        self
    }

    pub fn with_min_platform_version(mut self, version: impl Into<String>) -> Self {
        self.min_platform_version = version.into();
        self
    }

    pub fn with_env_credential(mut self, enabled: bool) -> Self {
        self.env_credential = enabled;
        self
    }

    /// Full URL of the chat-completions endpoint.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.chat_path.trim_start_matches('/')
        )
    }

    /// Resolve the credential for one request.
    ///
    /// Order: `stored` (from user settings), the configured key, then the
    /// `DEEPSEEK_API_KEY` environment variable (unless disabled). Blank values
    /// count as absent.
    pub fn resolve_api_key(&self, stored: Option<&str>) -> Option<SecretString> {
        if let Some(key) = stored.and_then(|k| non_blank(k.to_string())) {
            return Some(SecretString::from(key));
        }
        if let Some(key) = self
            .api_key
            .as_ref()
            .and_then(|k| non_blank(k.expose_secret().to_string()))
        {
            return Some(SecretString::from(key));
        }
        if !self.env_credential {
            return None;
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .and_then(non_blank)
            .map(SecretString::from)
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Stored field name of the API key.
pub const API_KEY_FIELD: &str = "deepseekApiKey";

/// User settings as persisted under `storage:settings`.
///
/// Decoding is per field: a field that fails to decode keeps its default
/// while the others, including the key, are still read.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(rename = "deepseekApiKey")]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub context_size: usize,
    pub system_prompt: String,
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            context_size: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: ChatRequest::DEFAULT_MAX_TOKENS,
        }
    }
}

impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(&Value::deserialize(deserializer)?))
    }
}

/// Overwrite `slot` with the stored field when it decodes.
///
/// Numbers saved as strings (`"0.8"`) are accepted.
fn read_field<T: DeserializeOwned>(fields: &Map<String, Value>, name: &str, slot: &mut T) {
    let Some(value) = fields.get(name) else {
        return;
    };
    if value.is_null() {
        return;
    }
    let decoded = T::deserialize(value).or_else(|e| match value {
        Value::String(s) => serde_json::from_str(s.trim()).map_err(|_| e),
        _ => Err(e),
    });
    match decoded {
        Ok(decoded) => *slot = decoded,
        Err(e) => tracing::warn!(setting = name, error = %e, "settings field unreadable, keeping default"),
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("has_api_key", &!self.api_key.trim().is_empty())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("context_size", &self.context_size)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Settings {
    /// Decode a stored settings record; anything but an object yields defaults.
    pub fn from_value(value: &Value) -> Self {
        let mut settings = Self::default();
        let Some(fields) = value.as_object() else {
            return settings;
        };
        read_field(fields, API_KEY_FIELD, &mut settings.api_key);
        read_field(fields, "model", &mut settings.model);
        read_field(fields, "temperature", &mut settings.temperature);
        read_field(fields, "contextSize", &mut settings.context_size);
        read_field(fields, "systemPrompt", &mut settings.system_prompt);
        read_field(fields, "maxTokens", &mut settings.max_tokens);
        settings
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Clamp values into their valid ranges and fill blanks with defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        self.api_key = self.api_key.trim().to_string();
        if self.model.trim().is_empty() {
            self.model = defaults.model;
        }
        if !self.temperature.is_finite() {
            self.temperature = defaults.temperature;
        }
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.context_size = self.context_size.max(1);
        if self.system_prompt.trim().is_empty() {
            self.system_prompt = defaults.system_prompt;
        }
        if self.max_tokens == 0 {
            self.max_tokens = defaults.max_tokens;
        }
        self
    }

    /// Request body for the trailing context window of `history`.
    pub fn request_for(&self, history: &[ChatMessage]) -> ChatRequest {
        ChatRequest::from_history(
            self.model.clone(),
            &self.system_prompt,
            history,
            self.context_size,
        )
        .temperature(self.temperature)
        .max_tokens(self.max_tokens)
    }
}
