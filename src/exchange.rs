//! Exchange-level types shared by the client and its callers.

use crate::error::ClassifiedError;

/// Sink for the text of one in-progress assistant message.
///
/// Implementations own the message; the client only pushes text into it.
/// Both calls are fire-and-forget: persistence failures stay inside the
/// implementation.
pub trait MessageAccumulator: Send + Sync + 'static {
    /// Append `delta`. Called once per decoded delta, in arrival order.
    fn on_delta(&self, delta: &str);

    /// Replace the whole content atomically.
    fn on_final(&self, content: &str);
}

impl<A: MessageAccumulator + ?Sized> MessageAccumulator for std::sync::Arc<A> {
    fn on_delta(&self, delta: &str) {
        (**self).on_delta(delta)
    }

    fn on_final(&self, content: &str) {
        (**self).on_final(content)
    }
}

/// Per-exchange options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Try streaming first. When `false` the blocking path is used directly.
    pub stream: bool,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self { stream: true }
    }
}

impl ExchangeOptions {
    pub fn streaming() -> Self {
        Self { stream: true }
    }

    pub fn blocking() -> Self {
        Self { stream: false }
    }
}

/// Why an exchange ended up on the blocking path.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// The stream completed without a single delta.
    EmptyStream,
    /// The stream failed (deltas received so far were discarded).
    StreamFailed(ClassifiedError),
    /// Streaming was not attempted: not requested or not supported by the host.
    StreamingUnsupported,
}

/// Successful end of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Streamed { content: String, deltas: usize },
    Fallback { content: String, reason: FallbackReason },
    Proxied { content: String },
    /// Cancelled by the caller. Nothing was written after the cancel.
    Cancelled,
}

impl ExchangeOutcome {
    /// Final message text, if the exchange produced one.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Streamed { content, .. }
            | Self::Fallback { content, .. }
            | Self::Proxied { content } => Some(content),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
