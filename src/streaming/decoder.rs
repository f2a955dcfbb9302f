//! SSE frame decoder
//!
//! Turns the raw, arbitrarily fragmented body of a streaming chat-completions
//! response into discrete events. Framing is line oriented: every complete
//! line that starts with `data:` carries either a JSON chunk or the `[DONE]`
//! sentinel. Anything else (comments, `event:` lines, blank keep-alives) is
//! ignored.
//!
//! The decoder only buffers; it never lets chunk boundaries influence what is
//! emitted. Feeding the same bytes split at any offsets yields the same event
//! sequence.

use super::utf8::Utf8StreamDecoder;
use crate::types::StreamChunk;
use serde::Deserialize;

const DATA_FIELD: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// Non-empty incremental content of the first choice.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
    /// A `data:` line whose payload is not a JSON object of the expected shape.
    Malformed,
}

/// Incremental decoder with a carry-over buffer for the last partial line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8StreamDecoder,
    buffer: String,
    done: bool,
    deltas_emitted: usize,
    malformed_lines: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk of the body.
    ///
    /// Chunks arriving after `Done` are accepted and ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        if self.done {
            tracing::trace!(bytes = chunk.len(), "ignoring chunk after [DONE]");
            return Vec::new();
        }

        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let carry = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, carry);

        let mut events = Vec::new();
        for line in complete.split('\n') {
            if self.push_line(line, &mut events) {
                break;
            }
        }
        events
    }

    /// Flush at natural end of the body.
    ///
    /// A final line without a trailing newline is decoded as if it had one.
    pub fn finish(&mut self) -> Vec<DecodedEvent> {
        if self.done {
            return Vec::new();
        }
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let rest = std::mem::take(&mut self.buffer);

        let mut events = Vec::new();
        for line in rest.split('\n') {
            if self.push_line(line, &mut events) {
                break;
            }
        }
        events
    }

    /// Whether `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn deltas_emitted(&self) -> usize {
        self.deltas_emitted
    }

    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    /// Decode one complete line. Returns `true` once `[DONE]` was reached.
    fn push_line(&mut self, line: &str, events: &mut Vec<DecodedEvent>) -> bool {
        let line = line.trim();
        let Some(payload) = line.strip_prefix(DATA_FIELD) else {
            return false;
        };
        let payload = payload.trim_start();

        if payload == DONE_SENTINEL {
            tracing::debug!(
                deltas = self.deltas_emitted,
                malformed = self.malformed_lines,
                "stream reached [DONE]"
            );
            self.done = true;
            self.buffer.clear();
            events.push(DecodedEvent::Done);
            return true;
        }

        match parse_chunk(payload) {
            Ok(chunk) => {
                if let Some(delta) = chunk.delta_content() {
                    self.deltas_emitted += 1;
                    events.push(DecodedEvent::Delta(delta.to_string()));
                }
            }
            Err(e) => {
                self.malformed_lines += 1;
                let sample: String = payload.chars().take(100).collect();
                tracing::warn!(error = %e, sample = %sample, "skipping malformed SSE data line");
                events.push(DecodedEvent::Malformed);
            }
        }
        false
    }
}

fn parse_chunk(payload: &str) -> Result<StreamChunk, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("SSE payload is not a JSON object"));
    }
    StreamChunk::deserialize(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn delta_line(text: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    #[test]
    fn decodes_complete_lines() {
        let mut dec = SseDecoder::new();
        let body = format!("{}{}data: [DONE]\n", delta_line("Hi"), delta_line(" there"));
        let events = dec.feed(body.as_bytes());
        assert_eq!(
            events,
            vec![
                DecodedEvent::Delta("Hi".into()),
                DecodedEvent::Delta(" there".into()),
                DecodedEvent::Done,
            ]
        );
        assert!(dec.is_done());
        assert_eq!(dec.deltas_emitted(), 2);
    }

    #[test]
    fn partial_line_is_carried_over() {
        let mut dec = SseDecoder::new();
        let line = delta_line("abc");
        let (a, b) = line.split_at(10);
        assert!(dec.feed(a.as_bytes()).is_empty());
        assert_eq!(dec.feed(b.as_bytes()), vec![DecodedEvent::Delta("abc".into())]);
    }

    #[test]
    fn ignores_non_data_lines_and_empty_deltas() {
        let mut dec = SseDecoder::new();
        let body = concat!(
            ": keep-alive\n",
            "event: message\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n",
        );
        assert_eq!(dec.feed(body.as_bytes()), vec![DecodedEvent::Delta("x".into())]);
    }

    #[traced_test]
    #[test]
    fn malformed_line_does_not_abort() {
        let mut dec = SseDecoder::new();
        let body = format!("data: {{not json\ndata: 42\n{}", delta_line("ok"));
        assert_eq!(
            dec.feed(body.as_bytes()),
            vec![
                DecodedEvent::Malformed,
                DecodedEvent::Malformed,
                DecodedEvent::Delta("ok".into()),
            ]
        );
        assert_eq!(dec.malformed_lines(), 2);
        assert!(logs_contain("skipping malformed SSE data line"));
    }

    #[test]
    fn done_stops_the_pass_and_later_chunks_are_ignored() {
        let mut dec = SseDecoder::new();
        let body = format!("data: [DONE]\n{}", delta_line("late"));
        assert_eq!(dec.feed(body.as_bytes()), vec![DecodedEvent::Done]);
        assert!(dec.feed(delta_line("later").as_bytes()).is_empty());
        assert!(dec.finish().is_empty());
    }

    #[test]
    fn finish_decodes_unterminated_last_line() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed(b"data: [DO").is_empty());
        assert!(dec.feed(b"NE]").is_empty());
        assert_eq!(dec.finish(), vec![DecodedEvent::Done]);
    }

    #[test]
    fn multibyte_content_split_across_chunks() {
        let line = delta_line("你好，世界");
        let bytes = line.as_bytes();
        let mut dec = SseDecoder::new();
        let mut events = Vec::new();
        for b in bytes {
            events.extend(dec.feed(std::slice::from_ref(b)));
        }
        assert_eq!(events, vec![DecodedEvent::Delta("你好，世界".into())]);
    }
}
