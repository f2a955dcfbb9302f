//! HTTP failure normalization
//!
//! Turns a non-success response from the chat-completions endpoint into an
//! `LlmError::ApiError` whose message is already meaningful to an end user.

use super::types::LlmError;

/// Build an error from a non-2xx status and the (possibly empty) body text.
///
/// Well-known statuses get a fixed message; anything else prefers the
/// provider's own `error.message`, then a top-level `message`, then a
/// generic `HTTP {status} 错误`.
pub fn error_from_status(status: u16, body_text: &str) -> LlmError {
    let details = serde_json::from_str::<serde_json::Value>(body_text).ok();

    let message = match status {
        401 => "API密钥无效，请检查设置".to_string(),
        402 => {
            tracing::warn!(status, "API balance exhausted");
            "API余额不足，请充值后重试".to_string()
        }
        429 => "请求过于频繁，请稍后再试".to_string(),
        500 => "DeepSeek服务暂时不可用，请稍后重试".to_string(),
        503 => "DeepSeek服务繁忙，请稍后重试".to_string(),
        _ => details
            .as_ref()
            .and_then(provider_message)
            .unwrap_or_else(|| format!("HTTP {status} 错误")),
    };

    match details {
        Some(details) => LlmError::api_error_with_details(status, message, details),
        None => LlmError::api_error(status, message),
    }
}

fn provider_message(body: &serde_json::Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_use_fixed_messages() {
        let err = error_from_status(402, "");
        assert_eq!(err.status_code(), Some(402));
        assert_eq!(err.raw_message(), "API余额不足，请充值后重试");

        let err = error_from_status(401, r#"{"error":{"message":"bad key"}}"#);
        assert_eq!(err.raw_message(), "API密钥无效，请检查设置");
    }

    #[test]
    fn unknown_status_prefers_provider_message() {
        let err = error_from_status(418, r#"{"error":{"message":"I'm a teapot"}}"#);
        assert_eq!(err.raw_message(), "I'm a teapot");

        let err = error_from_status(404, r#"{"message":"no such model"}"#);
        assert_eq!(err.raw_message(), "no such model");

        let err = error_from_status(422, "<html>oops</html>");
        assert_eq!(err.raw_message(), "HTTP 422 错误");
    }
}
