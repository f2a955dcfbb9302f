//! One chat's message list.
//!
//! `Conversation` is the accumulator collaborator: it owns the messages, hands
//! out [`MessageSlot`]s that the client writes into, and persists the whole
//! list to `storage:chat_history` after every mutation (fire-and-forget).

use crate::config::Settings;
use crate::error::ClassifiedError;
use crate::exchange::MessageAccumulator;
use crate::storage::{CHAT_HISTORY_KEY, KeyValueStore, safe_get, safe_set};
use crate::types::{ChatMessage, ChatRequest, MessageId, MessageRole};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const WELCOME_MESSAGE: &str = "👋 欢迎使用像素陪伴精灵！\n\n为了开始对话，请先配置你的 DeepSeek API Key：\n\n\
1. 点击右上角设置按钮\n2. 访问 https://platform.deepseek.com 获取API密钥\n3. 在设置页面填入API密钥\n\n\
配置完成后就可以和我聊天了！✨";

/// Shared, cloneable handle to a chat history.
#[derive(Clone, Default)]
pub struct Conversation {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    store: Option<Arc<dyn KeyValueStore>>,
    messages: Mutex<Vec<ChatMessage>>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("messages", &self.len())
            .field("persistent", &self.inner.store.is_some())
            .finish()
    }
}

impl Conversation {
    /// Unpersisted conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the stored history (empty when missing or unreadable).
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let messages: Vec<ChatMessage> = safe_get(store.as_ref(), CHAT_HISTORY_KEY, Vec::new());
        tracing::debug!(messages = messages.len(), "conversation loaded");
        Self {
            inner: Arc::new(Inner {
                store: Some(store),
                messages: Mutex::new(messages),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.inner
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist under the lock so writes land in mutation order.
    fn persist(&self, messages: &[ChatMessage]) {
        if let Some(store) = &self.inner.store {
            safe_set(store.as_ref(), CHAT_HISTORY_KEY, messages);
        }
    }

    fn push(&self, message: ChatMessage, persist: bool) -> MessageId {
        let id = message.id;
        let mut messages = self.lock();
        messages.push(message);
        if persist {
            self.persist(&messages);
        }
        id
    }

    pub fn push_user(&self, text: impl Into<String>) -> MessageId {
        self.push(ChatMessage::user(text), true)
    }

    /// Add an empty assistant message to stream a reply into.
    pub fn begin_assistant(&self) -> MessageId {
        self.push(ChatMessage::assistant(String::new()), true)
    }

    fn modify(&self, id: MessageId, f: impl FnOnce(&mut String)) -> bool {
        let mut messages = self.lock();
        let Some(message) = messages.iter_mut().find(|m| m.id == id) else {
            tracing::debug!(%id, "message no longer present");
            return false;
        };
        f(&mut message.content);
        self.persist(&messages);
        true
    }

    /// Replace the content of `id`. Returns `false` when it no longer exists.
    pub fn update(&self, id: MessageId, content: &str) -> bool {
        self.modify(id, |c| {
            c.clear();
            c.push_str(content);
        })
    }

    pub fn append(&self, id: MessageId, delta: &str) -> bool {
        self.modify(id, |c| c.push_str(delta))
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    pub fn get(&self, id: MessageId) -> Option<ChatMessage> {
        self.lock().iter().find(|m| m.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        let mut messages = self.lock();
        messages.clear();
        self.persist(&messages);
        tracing::info!("conversation cleared");
    }

    /// Request body for the next reply: system prompt plus the trailing
    /// `context_size` messages.
    ///
    /// Call before [`begin_assistant`](Self::begin_assistant) so the empty
    /// placeholder is not part of the context.
    pub fn build_request(&self, settings: &Settings) -> ChatRequest {
        settings.request_for(&self.lock())
    }

    /// Accumulator writing into message `id`.
    pub fn accumulator(&self, id: MessageId) -> MessageSlot {
        MessageSlot {
            conversation: self.clone(),
            id,
        }
    }

    /// Show `error` to the user: into `id` when given, else as a new message.
    pub fn record_failure(&self, id: Option<MessageId>, error: &ClassifiedError) -> MessageId {
        let text = error.user_message();
        tracing::warn!(kind = %error.kind, raw = %error.raw_message, "exchange failed");
        match id {
            Some(id) if self.update(id, &text) => id,
            _ => self.push(ChatMessage::assistant(text), true),
        }
    }

    /// Add the configuration help message when no credential is set.
    ///
    /// The message is shown but not persisted on its own.
    pub fn welcome_if_unconfigured(&self, settings: &Settings) -> Option<MessageId> {
        if settings.has_api_key() {
            return None;
        }
        Some(self.push(ChatMessage::new(MessageRole::Assistant, WELCOME_MESSAGE), false))
    }
}

/// [`MessageAccumulator`] bound to one message of a [`Conversation`].
#[derive(Debug, Clone)]
pub struct MessageSlot {
    conversation: Conversation,
    id: MessageId,
}

impl MessageSlot {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn content(&self) -> Option<String> {
        self.conversation.get(self.id).map(|m| m.content)
    }
}

impl MessageAccumulator for MessageSlot {
    fn on_delta(&self, delta: &str) {
        self.conversation.append(self.id, delta);
    }

    fn on_final(&self, content: &str) {
        self.conversation.update(self.id, content);
    }
}
