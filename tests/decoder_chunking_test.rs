//! Chunking invariance of the SSE decoder
//!
//! Splitting a body at arbitrary byte offsets (including inside multi-byte
//! characters and inside the `data:` marker) must never change the events.

#[path = "support/stream_fixture.rs"]
mod stream_fixture;

use proptest::prelude::*;
use sprite_completion::DecodedEvent;
use stream_fixture::{decode_all, delta_line, load_fixture, split_at_offsets};

const FIXTURE: &str = "deepseek-chat-stream.sse";

fn expected_fixture_events() -> Vec<DecodedEvent> {
    vec![
        DecodedEvent::Delta("抱抱你".into()),
        DecodedEvent::Delta("，今天辛苦啦".into()),
        DecodedEvent::Delta(" ✨".into()),
        DecodedEvent::Done,
    ]
}

#[test]
fn fixture_decodes_in_one_piece() {
    let body = load_fixture(FIXTURE);
    assert_eq!(decode_all(&[body]), expected_fixture_events());
}

#[test]
fn fixture_decodes_byte_by_byte() {
    let body = load_fixture(FIXTURE);
    let chunks: Vec<Vec<u8>> = body.iter().map(|b| vec![*b]).collect();
    assert_eq!(decode_all(&chunks), expected_fixture_events());
}

fn mixed_body() -> Vec<u8> {
    let mut body = String::new();
    body.push_str(": ping\n\n");
    body.push_str(&delta_line("Hi"));
    body.push_str("data: {broken json\n");
    body.push_str("event: message\n");
    body.push_str(&delta_line(" 世界🌍"));
    body.push_str("data:    [DONE]   \n");
    body.push_str(&delta_line("after done"));
    body.into_bytes()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn fixture_is_chunking_invariant(offsets in prop::collection::vec(0usize..2048, 0..24)) {
        let body = load_fixture(FIXTURE);
        let chunks = split_at_offsets(&body, &offsets);
        prop_assert_eq!(decode_all(&chunks), expected_fixture_events());
    }

    #[test]
    fn mixed_body_is_chunking_invariant(offsets in prop::collection::vec(0usize..256, 0..32)) {
        let body = mixed_body();
        let whole = decode_all(&[body.clone()]);
        prop_assert_eq!(
            &whole,
            &vec![
                DecodedEvent::Delta("Hi".into()),
                DecodedEvent::Malformed,
                DecodedEvent::Delta(" 世界🌍".into()),
                DecodedEvent::Done,
            ]
        );
        prop_assert_eq!(decode_all(&split_at_offsets(&body, &offsets)), whole);
    }

    #[test]
    fn arbitrary_deltas_survive_any_split(
        texts in prop::collection::vec("\\PC{1,12}", 1..6),
        offsets in prop::collection::vec(0usize..512, 0..16),
    ) {
        let mut body = String::new();
        for text in &texts {
            body.push_str(&delta_line(text));
        }
        body.push_str("data: [DONE]\n");

        let mut expected: Vec<DecodedEvent> = texts
            .iter()
            .map(|t| DecodedEvent::Delta(t.clone()))
            .collect();
        expected.push(DecodedEvent::Done);

        let chunks = split_at_offsets(body.as_bytes(), &offsets);
        prop_assert_eq!(decode_all(&chunks), expected);
    }
}
