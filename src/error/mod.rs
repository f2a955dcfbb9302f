//! Error Handling Module
//!
//! This module provides error handling for the completion client, including:
//! - Core error type (`LlmError`, `ErrorCategory`) used inside the crate
//! - HTTP status mapping for the chat-completions endpoint
//! - The user-facing taxonomy (`ErrorKind`, `ClassifiedError`) and `classify`
//!
//! # Example
//!
//! ```rust,ignore
//! use sprite_completion::error::{classify, ErrorKind, LlmError};
//!
//! let error = LlmError::api_error(402, "API余额不足，请充值后重试");
//! assert_eq!(classify(&error).kind, ErrorKind::InsufficientBalance);
//! ```

mod classify;
mod conversions;
pub mod http;
pub mod types;

pub use classify::*;
pub use types::*;
