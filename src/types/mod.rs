//! Core data types: messages, request body and response payloads.

mod message;
mod request;
mod response;

pub use message::*;
pub use request::*;
pub use response::*;
