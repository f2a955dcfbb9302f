//! In-memory transport and accumulator for driving the client without a network

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures_util::StreamExt;
use secrecy::SecretString;
use sprite_completion::{
    ByteStream, ChatCompletion, ChatRequest, ChatTransport, LlmError, MessageAccumulator,
    ProxyTransport,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How `open_stream` behaves.
pub enum StreamScript {
    /// Deliver the chunks, then close.
    Chunks(Vec<Bytes>),
    /// Deliver the chunks, then fail mid-body.
    ChunksThenError(Vec<Bytes>, LlmError),
    /// Fail before any byte (e.g. a rejected status).
    Reject(LlmError),
    /// Deliver the chunks, then stay open forever.
    Hang(Vec<Bytes>),
    /// Chunks pushed by the test through a channel.
    Channel(mpsc::UnboundedReceiver<Result<Bytes, LlmError>>),
}

#[derive(Default)]
struct State {
    stream: Mutex<Option<StreamScript>>,
    blocking: Mutex<Option<Result<ChatCompletion, LlmError>>>,
    blocking_hangs: AtomicBool,
    stream_calls: AtomicUsize,
    blocking_calls: AtomicUsize,
    bodies: Mutex<Vec<ChatRequest>>,
}

/// Scripted [`ChatTransport`]; clones share state so tests keep a probe.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<State>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        *self.state.stream.lock().unwrap() = Some(script);
        self
    }

    pub fn with_stream_chunks<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks = chunks.into_iter().map(|c| Bytes::from(c.into())).collect();
        self.with_stream(StreamScript::Chunks(chunks))
    }

    pub fn with_blocking_reply(self, content: &str) -> Self {
        *self.state.blocking.lock().unwrap() = Some(Ok(ChatCompletion::from_text(content)));
        self
    }

    pub fn with_blocking_completion(self, completion: ChatCompletion) -> Self {
        *self.state.blocking.lock().unwrap() = Some(Ok(completion));
        self
    }

    pub fn with_blocking_error(self, error: LlmError) -> Self {
        *self.state.blocking.lock().unwrap() = Some(Err(error));
        self
    }

    /// Blocking requests never resolve.
    pub fn with_blocking_hang(self) -> Self {
        self.state.blocking_hangs.store(true, Ordering::SeqCst);
        self
    }

    /// Channel-backed stream; the returned sender feeds the body.
    pub fn channel(self) -> (Self, mpsc::UnboundedSender<Result<Bytes, LlmError>>) {
        let (tx, rx) = mpsc::unbounded();
        (self.with_stream(StreamScript::Channel(rx)), tx)
    }

    pub fn stream_calls(&self) -> usize {
        self.state.stream_calls.load(Ordering::SeqCst)
    }

    pub fn blocking_calls(&self) -> usize {
        self.state.blocking_calls.load(Ordering::SeqCst)
    }

    /// Every body the transport received, in order.
    pub fn bodies(&self) -> Vec<ChatRequest> {
        self.state.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn complete(
        &self,
        body: &ChatRequest,
        _credential: &SecretString,
    ) -> Result<ChatCompletion, LlmError> {
        self.state.blocking_calls.fetch_add(1, Ordering::SeqCst);
        self.state.bodies.lock().unwrap().push(body.clone());
        if self.state.blocking_hangs.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        self.state
            .blocking
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(LlmError::InternalError("no blocking reply scripted".into())))
    }

    async fn open_stream(
        &self,
        body: &ChatRequest,
        _credential: &SecretString,
    ) -> Result<ByteStream, LlmError> {
        self.state.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.state.bodies.lock().unwrap().push(body.clone());
        let script = self
            .state
            .stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| LlmError::InternalError("no stream scripted".into()))?;

        let stream: ByteStream = match script {
            StreamScript::Chunks(chunks) => {
                Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
            }
            StreamScript::ChunksThenError(chunks, error) => Box::pin(
                futures::stream::iter(chunks.into_iter().map(Ok))
                    .chain(futures::stream::once(async move { Err(error) })),
            ),
            StreamScript::Reject(error) => return Err(error),
            StreamScript::Hang(chunks) => Box::pin(
                futures::stream::iter(chunks.into_iter().map(Ok)).chain(futures::stream::pending()),
            ),
            StreamScript::Channel(rx) => Box::pin(rx),
        };
        Ok(stream)
    }
}

/// Proxy that always returns the same payload (or nothing).
#[derive(Clone, Default)]
pub struct FixedProxy {
    reply: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FixedProxy {
    pub fn replying(content: &str) -> Self {
        Self {
            reply: Some(content.to_string()),
            calls: Arc::default(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyTransport for FixedProxy {
    async fn forward(&self, _body: &ChatRequest) -> Option<ChatCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.as_deref().map(ChatCompletion::from_text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Delta(String),
    Final(String),
}

/// Accumulator that records every write.
#[derive(Clone, Default)]
pub struct RecordingAccumulator {
    writes: Arc<Mutex<Vec<Write>>>,
}

impl RecordingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn deltas(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                Write::Delta(d) => Some(d),
                Write::Final(_) => None,
            })
            .collect()
    }

    pub fn finals(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                Write::Final(f) => Some(f),
                Write::Delta(_) => None,
            })
            .collect()
    }
}

impl MessageAccumulator for RecordingAccumulator {
    fn on_delta(&self, delta: &str) {
        self.writes.lock().unwrap().push(Write::Delta(delta.to_string()));
    }

    fn on_final(&self, content: &str) {
        self.writes.lock().unwrap().push(Write::Final(content.to_string()));
    }
}

/// Poll `condition` until it holds, failing the test after about two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
