//! # sprite-completion
//!
//! Streaming chat-completion client for OpenAI-compatible endpoints
//! (DeepSeek by default).
//!
//! ## Features
//!
//! - **Incremental SSE decoding**: chunk boundaries never change what is emitted.
//! - **Cancellable sessions**: once `cancel()` returns, no callback fires.
//! - **Blocking fallback**: an empty or failed stream is retried once without streaming.
//! - **Stable error taxonomy**: every failure surfaces as a [`ClassifiedError`]
//!   with a user-facing message.
//! - **Pluggable transports**: custom [`ChatTransport`] and an optional
//!   [`ProxyTransport`] tried before the direct call.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sprite_completion::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CompletionClient::builder().api_key("sk-...").build()?;
//!
//!     let conversation = Conversation::new();
//!     conversation.push_user("今天有点累");
//!     let request = conversation.build_request(&Settings::default());
//!     let reply = conversation.begin_assistant();
//!
//!     let handle = client.run_exchange(
//!         &request,
//!         conversation.accumulator(reply),
//!         ExchangeOptions::streaming(),
//!     );
//!     match handle.wait().await {
//!         Ok(outcome) => println!("{}", outcome.content().unwrap_or_default()),
//!         Err(error) => println!("{}", error.user_message()),
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod exchange;
pub mod observability;
pub mod platform;
pub mod storage;
pub mod streaming;
pub mod transport;
pub mod types;

pub use client::{CompletionClient, CompletionClientBuilder, ExchangeHandle};
pub use config::{ClientConfig, Settings};
pub use conversation::{Conversation, MessageSlot};
pub use error::{ClassifiedError, ErrorKind, LlmError, RawError, classify};
pub use exchange::{ExchangeOptions, ExchangeOutcome, FallbackReason, MessageAccumulator};
pub use streaming::{
    DecodedEvent, SessionOutcome, SessionState, SseDecoder, StreamCallbacks, StreamHandle,
    StreamObserver,
};
pub use transport::{ByteStream, ChatTransport, HttpTransport, ProxyTransport};
pub use types::{ChatCompletion, ChatMessage, ChatRequest, MessageId, MessageRole};

/// Commonly used items.
pub mod prelude {
    pub use crate::client::{CompletionClient, ExchangeHandle};
    pub use crate::config::{ClientConfig, Settings};
    pub use crate::conversation::Conversation;
    pub use crate::error::{ClassifiedError, ErrorKind, classify};
    pub use crate::exchange::{ExchangeOptions, ExchangeOutcome, MessageAccumulator};
    pub use crate::storage::{KeyValueStore, MemoryStore};
    pub use crate::streaming::{StreamCallbacks, StreamObserver};
    pub use crate::types::{ChatMessage, ChatRequest, MessageRole};
}
