//! Key-value persistence seam.
//!
//! The host application owns durable storage; this crate only needs a small
//! JSON key-value contract. Reads are "safe": anything missing, null or
//! unreadable yields the default. Writes are fire-and-forget: failures are
//! logged and swallowed.

use crate::config::{API_KEY_FIELD, Settings};
use crate::error::LlmError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub const CHAT_HISTORY_KEY: &str = "storage:chat_history";
pub const SETTINGS_KEY: &str = "storage:settings";
pub const QUICK_PROMPTS_KEY: &str = "storage:quick_prompts";

pub const DEFAULT_QUICK_PROMPTS: [&str; 10] = [
    "我在呢，先抱抱你，慢慢和我说发生了什么 🤗",
    "你已经很努力了，今天也辛苦啦 ✨",
    "给你一点能量补给：深呼吸一下，我们一起想办法 💪",
    "可以和我分享一件让你开心的小事吗？ 😊",
    "遇到挫折不代表不行，只是还在路上～ 🌟",
    "给自己一个小点赞吧，你真的做得不错 👏",
    "现在最想被怎么陪伴？倾听/鼓励/一起分析？ 💭",
    "不着急回答，我会一直在，等你准备好 💝",
    "要不要一起做个3分钟放松呼吸？吸—停—呼— 🌸",
    "我很好奇今天的你，想从哪件小事聊起？ ✨",
];

/// Minimal JSON key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> Result<(), LlmError>;

    fn remove(&self, key: &str) -> Result<(), LlmError>;
}

/// In-process store, useful for tests and headless hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), LlmError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LlmError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Read and decode `key`, or return `default`.
pub fn safe_get<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, default: T) -> T {
    match store.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::String(s)) if s.is_empty() => default,
        Some(value) => match serde_json::from_value(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(key, error = %e, "stored value unreadable, using default");
                default
            }
        },
    }
}

/// Encode and write `value`; failures are logged. Returns whether it was written.
pub fn safe_set<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    let encoded = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(key, error = %e, "value not serializable, not stored");
            return false;
        }
    };
    match store.set(key, encoded) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "storage write failed");
            false
        }
    }
}

pub fn load_settings(store: &dyn KeyValueStore) -> Settings {
    safe_get(store, SETTINGS_KEY, Settings::default()).normalized()
}

/// The stored API key, read on its own so other unreadable fields cannot hide it.
pub fn load_api_key(store: &dyn KeyValueStore) -> Option<String> {
    let settings = store.get(SETTINGS_KEY)?;
    let key = settings.get(API_KEY_FIELD)?.as_str()?.trim();
    (!key.is_empty()).then(|| key.to_string())
}

pub fn save_settings(store: &dyn KeyValueStore, settings: &Settings) -> bool {
    safe_set(store, SETTINGS_KEY, settings)
}

/// Stored quick prompts, or the built-in list when none are stored.
pub fn load_quick_prompts(store: &dyn KeyValueStore) -> Vec<String> {
    let prompts: Vec<String> = safe_get(store, QUICK_PROMPTS_KEY, Vec::new());
    if prompts.is_empty() {
        DEFAULT_QUICK_PROMPTS.iter().map(|p| p.to_string()).collect()
    } else {
        prompts
    }
}

pub fn save_quick_prompts(store: &dyn KeyValueStore, prompts: &[String]) -> bool {
    safe_set(store, QUICK_PROMPTS_KEY, prompts)
}

/// Remove history, settings and quick prompts.
pub fn clear_all(store: &dyn KeyValueStore) {
    for key in [CHAT_HISTORY_KEY, SETTINGS_KEY, QUICK_PROMPTS_KEY] {
        if let Err(e) = store.remove(key) {
            tracing::warn!(key, error = %e, "storage clear failed");
        }
    }
}
