//! Core error types.

use thiserror::Error;

/// Errors produced while talking to the completion endpoint.
///
/// These never leave an exchange directly: callers receive a
/// [`ClassifiedError`](super::ClassifiedError) built from them.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// HTTP-level failure without a usable status code.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Non-success response from the API.
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Request timed out: {0}")]
    TimeoutError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The byte stream broke after the handshake succeeded.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// The response body did not have the expected shape.
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    /// No credential is configured for direct requests.
    #[error("未配置API密钥")]
    MissingApiKey,

    /// The host runtime is too old for chunked responses.
    #[error("基础库版本过低，不支持流式请求 (version {version}, minimum {minimum})")]
    UnsupportedPlatform { version: String, minimum: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Coarse error category, mostly useful for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Billing,
    RateLimit,
    Client,
    Server,
    Network,
    Parsing,
    Unsupported,
    Configuration,
    Unknown,
}

impl LlmError {
    /// Create an API error from a status code and message.
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create an API error carrying the decoded response body.
    pub fn api_error_with_details(
        code: u16,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// HTTP status code, when the error came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ApiError { code, .. } => match code {
                401 | 403 => ErrorCategory::Authentication,
                402 => ErrorCategory::Billing,
                429 => ErrorCategory::RateLimit,
                400..=499 => ErrorCategory::Client,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Unknown,
            },
            Self::MissingApiKey => ErrorCategory::Authentication,
            Self::HttpError(_) | Self::TimeoutError(_) | Self::ConnectionError(_) => {
                ErrorCategory::Network
            }
            Self::StreamError(_) => ErrorCategory::Network,
            Self::ParseError(_) | Self::JsonError(_) => ErrorCategory::Parsing,
            Self::UnsupportedPlatform { .. } => ErrorCategory::Unsupported,
            Self::InvalidParameter(_) | Self::ConfigurationError(_) => {
                ErrorCategory::Configuration
            }
            Self::InternalError(_) => ErrorCategory::Unknown,
        }
    }

    /// Raw message without the variant prefix added by `Display`.
    pub fn raw_message(&self) -> String {
        match self {
            Self::ApiError { message, .. } => message.clone(),
            Self::HttpError(msg)
            | Self::TimeoutError(msg)
            | Self::ConnectionError(msg)
            | Self::StreamError(msg)
            | Self::ParseError(msg)
            | Self::JsonError(msg)
            | Self::InvalidParameter(msg)
            | Self::ConfigurationError(msg)
            | Self::InternalError(msg) => msg.clone(),
            Self::MissingApiKey | Self::UnsupportedPlatform { .. } => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_exposes_status_and_category() {
        let err = LlmError::api_error(429, "slow down");
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        assert_eq!(err.raw_message(), "slow down");
    }

    #[test]
    fn transport_failures_are_network() {
        assert_eq!(
            LlmError::TimeoutError("x".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            LlmError::ConnectionError("x".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(LlmError::MissingApiKey.status_code(), None);
    }
}
