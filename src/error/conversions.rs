//! Type Conversions for LlmError
//!
//! `From` implementations for the error types of the crates we call into.

use super::types::LlmError;

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::TimeoutError(format!("网络请求超时: {err}"));
        }
        if err.is_connect() {
            return Self::ConnectionError(format!("网络连接失败: {err}"));
        }
        if err.is_body() || err.is_decode() {
            return Self::StreamError(err.to_string());
        }
        Self::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}
