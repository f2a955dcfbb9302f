//! Transport abstraction.
//!
//! The completion client never talks to `reqwest` directly; it goes through
//! [`ChatTransport`], so tests and embedders can inject their own transport
//! (a "custom fetch"). [`HttpTransport`] is the default implementation.
//! [`ProxyTransport`] models the optional forwarding service that is tried
//! before any direct call.

mod http;
mod proxy;

pub use http::HttpTransport;
pub use proxy::ProxyTransport;

use crate::error::LlmError;
use crate::types::{ChatCompletion, ChatRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use secrecy::SecretString;
use std::pin::Pin;

/// Raw response body of a streaming request, chunk by chunk.
///
/// Dropping the stream releases the underlying connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Direct transport to the chat-completions endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Blocking (non-streaming) completion. `body.stream` is already `false`.
    async fn complete(
        &self,
        body: &ChatRequest,
        credential: &SecretString,
    ) -> Result<ChatCompletion, LlmError>;

    /// Open a streaming request and return its body once headers arrived.
    ///
    /// Non-success statuses are reported as errors here, before any chunk.
    async fn open_stream(
        &self,
        body: &ChatRequest,
        credential: &SecretString,
    ) -> Result<ByteStream, LlmError>;
}
