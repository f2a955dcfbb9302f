//! Test fixture utilities: load SSE bodies and re-chunk them

#![allow(dead_code)]

use sprite_completion::streaming::{DecodedEvent, SseDecoder};

/// Load a fixture from `tests/fixtures` as raw bytes.
pub fn load_fixture(name: &str) -> Vec<u8> {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read(&path).unwrap_or_else(|e| panic!("fixture {path}: {e}"))
}

/// Split `body` at the given byte offsets (out-of-range or unsorted offsets are tolerated).
pub fn split_at_offsets(body: &[u8], offsets: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = offsets.iter().map(|&o| o.min(body.len())).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        if cut > start {
            chunks.push(body[start..cut].to_vec());
            start = cut;
        }
    }
    if start < body.len() {
        chunks.push(body[start..].to_vec());
    }
    chunks
}

/// Feed `chunks` through a fresh decoder, flushing at the end.
pub fn decode_all(chunks: &[Vec<u8>]) -> Vec<DecodedEvent> {
    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(decoder.feed(chunk));
    }
    events.extend(decoder.finish());
    events
}

/// `data:` line carrying one content delta.
pub fn delta_line(text: &str) -> String {
    format!(
        "data: {}\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}
