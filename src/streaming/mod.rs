//! Streaming support
//!
//! Byte-level decoding of `text/event-stream` bodies and the session
//! controller that drives one streaming exchange.

mod decoder;
mod session;
mod utf8;

pub use decoder::{DecodedEvent, SseDecoder};
pub use session::{
    SessionControl, SessionOptions, SessionOutcome, SessionState, StreamCallbacks, StreamHandle,
    StreamObserver, StreamSession,
};
pub use utf8::Utf8StreamDecoder;
