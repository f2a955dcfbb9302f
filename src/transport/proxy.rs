use crate::types::{ChatCompletion, ChatRequest};
use async_trait::async_trait;

/// Optional forwarding service tried before any direct request.
///
/// Returning `None` means "no usable payload": the caller falls through to the
/// direct transport. Implementations report their own failures as `None`
/// (after logging them); a proxy can never fail an exchange.
#[async_trait]
pub trait ProxyTransport: Send + Sync {
    async fn forward(&self, body: &ChatRequest) -> Option<ChatCompletion>;
}
