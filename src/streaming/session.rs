//! Stream session controller
//!
//! Owns one in-flight streaming exchange: it opens the request, feeds the
//! body through the [`SseDecoder`], and reports deltas and the terminal event
//! to a [`StreamObserver`].
//!
//! Lifecycle: `Idle -> Active -> {Completed, Aborted, Failed}`. Every
//! callback is delivered under the session lock and only while the session
//! is `Active`, so once [`SessionControl::cancel`] returns nothing else
//! reaches the observer, no matter what the transport still delivers.
//! Callbacks must therefore not call `cancel` on their own session.

use super::decoder::{DecodedEvent, SseDecoder};
use crate::error::{ClassifiedError, LlmError, classify};
use crate::transport::{ByteStream, ChatTransport};
use crate::types::ChatRequest;
use futures_util::StreamExt;
use secrecy::SecretString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Completed,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }
}

/// Receiver of one session's events.
///
/// Owned by the session task; `on_done` and `on_error` are mutually
/// exclusive and fire at most once.
pub trait StreamObserver: Send + 'static {
    fn on_message(&mut self, delta: &str);

    fn on_done(&mut self) {}

    fn on_error(&mut self, _error: &ClassifiedError) {}
}

type MessageFn = Box<dyn FnMut(&str) + Send>;
type DoneFn = Box<dyn FnMut() + Send>;
type ErrorFn = Box<dyn FnMut(&ClassifiedError) + Send>;

/// Closure-based observer.
///
/// ```rust,ignore
/// let callbacks = StreamCallbacks::new()
///     .on_message(|delta| print!("{delta}"))
///     .on_done(|| println!())
///     .on_error(|e| eprintln!("{e}"));
/// ```
#[derive(Default)]
pub struct StreamCallbacks {
    on_message: Option<MessageFn>,
    on_done: Option<DoneFn>,
    on_error: Option<ErrorFn>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    pub fn on_done(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&ClassifiedError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl StreamObserver for StreamCallbacks {
    fn on_message(&mut self, delta: &str) {
        if let Some(f) = self.on_message.as_mut() {
            f(delta);
        }
    }

    fn on_done(&mut self) {
        if let Some(f) = self.on_done.as_mut() {
            f();
        }
    }

    fn on_error(&mut self, error: &ClassifiedError) {
        if let Some(f) = self.on_error.as_mut() {
            f(error);
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// `[DONE]` or natural end of the body.
    Completed {
        content: String,
        deltas: usize,
        malformed: usize,
    },
    /// Cancelled by the caller; nothing after the cancel was delivered.
    Aborted { deltas: usize },
    /// Transport failure (including timeouts).
    Failed {
        error: ClassifiedError,
        content: String,
        deltas: usize,
    },
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Completed { .. } => SessionState::Completed,
            Self::Aborted { .. } => SessionState::Aborted,
            Self::Failed { .. } => SessionState::Failed,
        }
    }

    pub fn deltas(&self) -> usize {
        match self {
            Self::Completed { deltas, .. }
            | Self::Aborted { deltas }
            | Self::Failed { deltas, .. } => *deltas,
        }
    }
}

struct SessionShared {
    state: Mutex<SessionState>,
    token: CancellationToken,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable cancel/inspect side of a session.
#[derive(Clone)]
pub struct SessionControl {
    shared: Arc<SessionShared>,
}

impl SessionControl {
    /// Abort the session and release its connection.
    ///
    /// Idempotent; a no-op once the session reached a terminal state.
    pub fn cancel(&self) {
        {
            let mut state = self.shared.lock();
            if !state.is_terminal() {
                *state = SessionState::Aborted;
                tracing::info!("stream session cancelled");
            }
        }
        self.shared.token.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.shared.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == SessionState::Aborted
    }
}

impl std::fmt::Debug for SessionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionControl")
            .field("state", &self.state())
            .finish()
    }
}

/// Caller-owned handle to a running session.
#[derive(Debug)]
pub struct StreamHandle {
    control: SessionControl,
    outcome: oneshot::Receiver<SessionOutcome>,
}

impl StreamHandle {
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Wait for the session to reach a terminal state.
    pub async fn wait(self) -> SessionOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            // The task is gone without reporting (runtime shutdown).
            Err(_) => SessionOutcome::Aborted { deltas: 0 },
        }
    }
}

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on the handshake and on the gap between two chunks.
    pub idle_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Entry point for starting sessions.
pub struct StreamSession;

impl StreamSession {
    /// Start a streaming request on the current tokio runtime.
    ///
    /// `body.stream` is forced to `true`. `parent` lets an outer operation
    /// cancel the session together with itself.
    pub fn start<O>(
        transport: Arc<dyn ChatTransport>,
        body: &ChatRequest,
        credential: SecretString,
        observer: O,
        options: SessionOptions,
        parent: Option<&CancellationToken>,
    ) -> StreamHandle
    where
        O: StreamObserver,
    {
        Self::start_with(transport, body, credential, observer, options, parent, |_| {})
    }

    /// Like [`StreamSession::start`], handing the control to `register`
    /// before the driver is spawned.
    pub(crate) fn start_with<O>(
        transport: Arc<dyn ChatTransport>,
        body: &ChatRequest,
        credential: SecretString,
        observer: O,
        options: SessionOptions,
        parent: Option<&CancellationToken>,
        register: impl FnOnce(&SessionControl),
    ) -> StreamHandle
    where
        O: StreamObserver,
    {
        let token = parent.map(|p| p.child_token()).unwrap_or_default();
        let shared = Arc::new(SessionShared {
            state: Mutex::new(SessionState::Idle),
            token,
        });
        let control = SessionControl {
            shared: shared.clone(),
        };
        let (tx, rx) = oneshot::channel();

        *shared.lock() = SessionState::Active;
        register(&control);

        let body = body.with_stream(true);
        let span = tracing::info_span!("stream_session", model = %body.model);
        let driver = Driver {
            emitter: Emitter { shared, observer },
            content: String::new(),
            deltas: 0,
        };
        tokio::spawn(
            async move {
                let outcome = driver.run(transport, body, credential, options).await;
                tracing::debug!(state = ?outcome.state(), deltas = outcome.deltas(), "stream session finished");
                let _ = tx.send(outcome);
            }
            .instrument(span),
        );

        StreamHandle {
            control,
            outcome: rx,
        }
    }
}

/// Emission guard around the observer.
struct Emitter<O> {
    shared: Arc<SessionShared>,
    observer: O,
}

impl<O: StreamObserver> Emitter<O> {
    /// Deliver a delta if the session is still active.
    fn message(&mut self, delta: &str) -> bool {
        let mut state = self.shared.lock();
        if !self.still_active(&mut state) {
            return false;
        }
        self.observer.on_message(delta);
        true
    }

    /// Move to `terminal` and deliver the matching callback exactly once.
    fn terminate(&mut self, terminal: SessionState, error: Option<&ClassifiedError>) -> bool {
        let mut state = self.shared.lock();
        if !self.still_active(&mut state) {
            return false;
        }
        *state = terminal;
        match error {
            Some(error) => self.observer.on_error(error),
            None => self.observer.on_done(),
        }
        true
    }

    fn still_active(&self, state: &mut SessionState) -> bool {
        if *state == SessionState::Active && self.shared.token.is_cancelled() {
            // Cancelled through a parent token.
            *state = SessionState::Aborted;
        }
        *state == SessionState::Active
    }
}

struct Driver<O> {
    emitter: Emitter<O>,
    content: String,
    deltas: usize,
}

enum Step {
    Continue,
    Done,
    Aborted,
}

impl<O: StreamObserver> Driver<O> {
    async fn run(
        mut self,
        transport: Arc<dyn ChatTransport>,
        body: ChatRequest,
        credential: SecretString,
        options: SessionOptions,
    ) -> SessionOutcome {
        let token = self.emitter.shared.token.clone();
        let idle = options.idle_timeout;

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return self.aborted(),
            opened = tokio::time::timeout(idle, transport.open_stream(&body, &credential)) => opened,
        };
        let mut stream: ByteStream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return self.failed(e),
            Err(_) => return self.failed(timeout_error(idle)),
        };

        let mut decoder = SseDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return self.aborted(),
                next = tokio::time::timeout(idle, stream.next()) => next,
            };
            let events = match next {
                Ok(Some(Ok(chunk))) => {
                    tracing::trace!(bytes = chunk.len(), "chunk received");
                    decoder.feed(&chunk)
                }
                Ok(Some(Err(e))) => return self.failed(e),
                Ok(None) => {
                    let mut tail = decoder.finish();
                    if !tail.contains(&DecodedEvent::Done) {
                        // Natural close counts as completion.
                        tail.push(DecodedEvent::Done);
                    }
                    tail
                }
                Err(_) => return self.failed(timeout_error(idle)),
            };

            match self.apply(events) {
                Step::Continue => {}
                Step::Done => {
                    // Dropping the body releases the connection right away.
                    drop(stream);
                    return self.completed(decoder.malformed_lines());
                }
                Step::Aborted => return self.aborted(),
            }
        }
    }

    fn apply(&mut self, events: Vec<DecodedEvent>) -> Step {
        for event in events {
            match event {
                DecodedEvent::Delta(text) => {
                    if !self.emitter.message(&text) {
                        return Step::Aborted;
                    }
                    self.deltas += 1;
                    self.content.push_str(&text);
                }
                DecodedEvent::Done => return Step::Done,
                DecodedEvent::Malformed => {}
            }
        }
        Step::Continue
    }

    fn completed(mut self, malformed: usize) -> SessionOutcome {
        if !self.emitter.terminate(SessionState::Completed, None) {
            return self.aborted();
        }
        tracing::info!(deltas = self.deltas, malformed, "stream completed");
        SessionOutcome::Completed {
            content: self.content,
            deltas: self.deltas,
            malformed,
        }
    }

    fn failed(mut self, error: LlmError) -> SessionOutcome {
        let classified = classify(&error);
        if !self.emitter.terminate(SessionState::Failed, Some(&classified)) {
            return self.aborted();
        }
        tracing::warn!(error = %error, kind = %classified.kind, deltas = self.deltas, "stream failed");
        SessionOutcome::Failed {
            error: classified,
            content: self.content,
            deltas: self.deltas,
        }
    }

    fn aborted(self) -> SessionOutcome {
        let mut state = self.emitter.shared.lock();
        if !state.is_terminal() {
            *state = SessionState::Aborted;
        }
        tracing::debug!(deltas = self.deltas, "stream aborted");
        SessionOutcome::Aborted {
            deltas: self.deltas,
        }
    }
}

fn timeout_error(idle: Duration) -> LlmError {
    LlmError::TimeoutError(format!("网络请求超时 ({}s without data)", idle.as_secs()))
}
