//! Stream one reply from DeepSeek into an in-memory conversation.
//!
//! ```bash
//! export DEEPSEEK_API_KEY="sk-..."
//! cargo run --example stream_chat -- "今天有点累"
//! ```

use sprite_completion::observability::{TracingConfig, init_tracing};
use sprite_completion::prelude::*;
use std::io::Write;

/// Prints deltas as they arrive and keeps the conversation up to date.
struct Printer {
    slot: sprite_completion::MessageSlot,
}

impl MessageAccumulator for Printer {
    fn on_delta(&self, delta: &str) {
        print!("{delta}");
        let _ = std::io::stdout().flush();
        self.slot.on_delta(delta);
    }

    fn on_final(&self, content: &str) {
        self.slot.on_final(content);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&TracingConfig::new().with_filter("sprite_completion=warn"))?;

    let text = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let text = if text.trim().is_empty() {
        "给我一句今天的鼓励吧".to_string()
    } else {
        text
    };

    let store = std::sync::Arc::new(MemoryStore::new());
    let settings = sprite_completion::storage::load_settings(store.as_ref());
    let conversation = Conversation::load(store.clone());
    let client = CompletionClient::builder().settings_store(store).build()?;

    if client.credential().is_none() {
        conversation.welcome_if_unconfigured(&settings);
        for message in conversation.messages() {
            println!("{}", message.content);
        }
        return Ok(());
    }

    conversation.push_user(text.clone());
    let request = conversation.build_request(&settings);
    let reply = conversation.begin_assistant();
    println!("🧑 {text}");
    print!("🧚 ");

    let handle = client.run_exchange(
        &request,
        Printer {
            slot: conversation.accumulator(reply),
        },
        ExchangeOptions::streaming(),
    );

    match handle.wait().await {
        Ok(ExchangeOutcome::Fallback { content, reason }) => {
            println!("{content}\n(fallback: {reason:?})");
        }
        Ok(_) => println!(),
        Err(error) => {
            conversation.record_failure(Some(reply), &error);
            println!("\n{}", error.user_message());
        }
    }
    Ok(())
}
