//! Logging setup and log hygiene helpers.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the application. [`init_tracing`] is a convenience for binaries and
//! demos.

use crate::error::LlmError;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

static MASK_SENSITIVE_VALUES: AtomicBool = AtomicBool::new(true);

pub fn set_mask_sensitive_values(mask: bool) {
    MASK_SENSITIVE_VALUES.store(mask, Ordering::Relaxed);
}

pub fn get_mask_sensitive_values() -> bool {
    MASK_SENSITIVE_VALUES.load(Ordering::Relaxed)
}

/// Mask a credential-like value for logging.
///
/// Bearer tokens and `sk-` keys keep a short prefix and suffix; other long
/// values keep six leading and four trailing characters.
pub fn mask_sensitive_value(value: &str) -> String {
    if !get_mask_sensitive_values() {
        return value.to_string();
    }
    if let Some(token) = value.strip_prefix("Bearer ") {
        return format!("Bearer {}", mask_keep(token, 4, 4, 8));
    }
    if value.starts_with("sk-") {
        return mask_keep(value, 8, 4, 12);
    }
    mask_keep(value, 6, 4, 16)
}

fn mask_keep(value: &str, head: usize, tail: usize, min_len: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= min_len {
        // Too short to reveal anything safely.
        return "*".repeat(chars.len().min(8));
    }
    let prefix: String = chars[..head].iter().collect();
    let suffix: String = chars[chars.len() - tail..].iter().collect();
    format!("{prefix}...{suffix}")
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Subscriber configuration for [`init_tracing`].
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directive used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub format: OutputFormat,
    pub with_target: bool,
    /// Fail when a global subscriber is already installed.
    pub strict: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_filter: "sprite_completion=info".to_string(),
            format: OutputFormat::default(),
            with_target: true,
            strict: false,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug() -> Self {
        Self {
            default_filter: "sprite_completion=debug".to_string(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, LlmError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_filter).map_err(|e| {
                LlmError::ConfigurationError(format!(
                    "invalid log filter '{}': {e}",
                    self.default_filter
                ))
            }),
        }
    }
}

/// Install a global `tracing` subscriber.
///
/// Returns `Ok(false)` when another subscriber is already installed and the
/// config is not strict.
pub fn init_tracing(config: &TracingConfig) -> Result<bool, LlmError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = match config.format {
        OutputFormat::Pretty => builder.pretty().try_init(),
        OutputFormat::Compact => builder.compact().try_init(),
        OutputFormat::Json => builder.json().try_init(),
    };

    match installed {
        Ok(()) => Ok(true),
        Err(e) if config.strict => Err(LlmError::ConfigurationError(format!(
            "tracing subscriber already installed: {e}"
        ))),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_bearer_and_keys() {
        assert_eq!(
            mask_sensitive_value("Bearer sk-1234567890abcdef"),
            "Bearer sk-1...cdef"
        );
        assert_eq!(
            mask_sensitive_value("sk-1234567890abcdef"),
            "sk-12345...cdef"
        );
        assert_eq!(mask_sensitive_value("sk-short"), "********");
    }

    #[test]
    fn masking_is_char_safe() {
        let masked = mask_sensitive_value("密钥密钥密钥密钥密钥密钥密钥密钥密钥");
        assert!(masked.contains("..."));
    }

    #[test]
    fn bad_filter_is_a_configuration_error() {
        // RUST_LOG takes precedence over the configured directive.
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let err = TracingConfig::new()
            .with_filter("sprite_completion=loudest")
            .env_filter()
            .unwrap_err();
        assert!(matches!(err, LlmError::ConfigurationError(_)));
    }
}
