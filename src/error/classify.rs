//! User-facing error taxonomy.
//!
//! Every failure that reaches a caller is folded into one [`ErrorKind`] with a
//! fixed presentation template. Classification is a pure table lookup over
//! the status code and the raw message, evaluated in priority order; the
//! first matching row wins.

use super::types::LlmError;
use serde::Serialize;
use std::fmt;

/// Categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    UnsupportedPlatform,
    MissingCredential,
    InvalidCredential,
    InsufficientBalance,
    RateLimited,
    NetworkUnreachable,
    MalformedResponse,
    Unclassified,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedPlatform => "unsupported-platform",
            Self::MissingCredential => "missing-credential",
            Self::InvalidCredential => "invalid-credential",
            Self::InsufficientBalance => "insufficient-balance",
            Self::RateLimited => "rate-limited",
            Self::NetworkUnreachable => "network-unreachable",
            Self::MalformedResponse => "malformed-response",
            Self::Unclassified => "unclassified",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            Self::UnsupportedPlatform => "📱 当前基础库版本过低\n\n暂不支持流式回复，请升级后重试。",
            Self::MissingCredential => "🔑 未配置API密钥\n\n请在设置中填写 DeepSeek API Key 后再试。",
            Self::InvalidCredential => "🔑 API密钥问题\n\n请检查设置中的API密钥是否正确。",
            Self::InsufficientBalance => "💰 API余额不足\n\n请前往 DeepSeek 平台充值后继续使用。",
            Self::RateLimited => "⏰ 请求过于频繁\n\n请稍后再试。",
            Self::NetworkUnreachable => "🌐 网络连接问题\n\n请检查网络连接后重试。",
            Self::MalformedResponse => "😅 出现了一些问题\n\nAPI返回数据格式错误",
            Self::Unclassified => "😅 出现了一些问题\n\n",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure: the category plus the raw message it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub raw_message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, raw_message: impl Into<String>) -> Self {
        Self {
            kind,
            raw_message: raw_message.into(),
        }
    }

    /// Text suitable for showing in place of an assistant reply.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Unclassified => format!("{}{}", self.kind.template(), self.raw_message),
            kind => kind.template().to_string(),
        }
    }

    /// True for both an absent and a rejected credential.
    pub fn is_credential_problem(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::MissingCredential | ErrorKind::InvalidCredential
        )
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for ClassifiedError {}

/// Classifier input: whatever is known about a failure.
#[derive(Debug, Clone, Default)]
pub struct RawError {
    pub status: Option<u16>,
    pub message: String,
    /// Category implied by the error's origin rather than its text.
    pub origin: Option<ErrorKind>,
}

impl From<&LlmError> for RawError {
    fn from(err: &LlmError) -> Self {
        let origin = match err {
            LlmError::MissingApiKey => Some(ErrorKind::MissingCredential),
            LlmError::UnsupportedPlatform { .. } => Some(ErrorKind::UnsupportedPlatform),
            LlmError::ParseError(_) | LlmError::JsonError(_) => Some(ErrorKind::MalformedResponse),
            LlmError::TimeoutError(_)
            | LlmError::ConnectionError(_)
            | LlmError::StreamError(_)
            | LlmError::HttpError(_) => Some(ErrorKind::NetworkUnreachable),
            _ => None,
        };
        Self {
            status: err.status_code(),
            message: err.raw_message(),
            origin,
        }
    }
}

impl From<LlmError> for RawError {
    fn from(err: LlmError) -> Self {
        Self::from(&err)
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
            ..Default::default()
        }
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        Self {
            message,
            ..Default::default()
        }
    }
}

struct Rule {
    kind: ErrorKind,
    status: u16,
    needles: &'static [&'static str],
}

// Priority order matters: first match wins.
const RULES: &[Rule] = &[
    Rule {
        kind: ErrorKind::InsufficientBalance,
        status: 402,
        needles: &[
            "402",
            "余额不足",
            "insufficient balance",
            "insufficient_balance",
            "insufficient_quota",
        ],
    },
    Rule {
        kind: ErrorKind::InvalidCredential,
        status: 401,
        needles: &[
            "401",
            "api密钥",
            "invalid api key",
            "invalid_api_key",
            "unauthorized",
            "authentication",
        ],
    },
    Rule {
        kind: ErrorKind::RateLimited,
        status: 429,
        needles: &["429", "请求过于频繁", "rate limit", "too many requests"],
    },
];

const NETWORK_NEEDLES: &[&str] = &[
    "网络",
    "network",
    "timed out",
    "timeout",
    "connection",
    "unreachable",
];

/// Classify a failure. Total and pure: never panics, same input, same output.
pub fn classify(raw: impl Into<RawError>) -> ClassifiedError {
    let raw = raw.into();

    // Failures synthesized before any request was made are not text-matched.
    if let Some(
        kind @ (ErrorKind::MissingCredential
        | ErrorKind::UnsupportedPlatform
        | ErrorKind::MalformedResponse),
    ) = raw.origin
    {
        return ClassifiedError::new(kind, raw.message);
    }

    let lower = raw.message.to_lowercase();

    for rule in RULES {
        if raw.status == Some(rule.status) || rule.needles.iter().any(|n| lower.contains(n)) {
            return ClassifiedError::new(rule.kind, raw.message);
        }
    }

    if NETWORK_NEEDLES.iter().any(|n| lower.contains(n))
        || raw.origin == Some(ErrorKind::NetworkUnreachable)
    {
        return ClassifiedError::new(ErrorKind::NetworkUnreachable, raw.message);
    }

    ClassifiedError::new(ErrorKind::Unclassified, raw.message)
}
