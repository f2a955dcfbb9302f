//! Resumable UTF-8 decoding for chunked bodies.

/// Decodes a byte stream to text across arbitrary chunk boundaries.
///
/// A multi-byte sequence split between two chunks is held back until the
/// rest of it arrives. Bytes that can never form valid UTF-8 are replaced
/// with U+FFFD, so decoding never fails.
#[derive(Debug, Default, Clone)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of input; a dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_multibyte_character_is_buffered() {
        let text = "你好";
        let bytes = text.as_bytes();
        let mut dec = Utf8StreamDecoder::new();

        assert_eq!(dec.decode(&bytes[..1]), "");
        assert!(dec.has_pending());
        assert_eq!(dec.decode(&bytes[1..4]), "你");
        assert_eq!(dec.decode(&bytes[4..]), "好");
        assert!(!dec.has_pending());
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut dec = Utf8StreamDecoder::new();
        assert_eq!(dec.decode(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn finish_flushes_dangling_prefix() {
        let mut dec = Utf8StreamDecoder::new();
        assert_eq!(dec.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(dec.finish(), "\u{FFFD}");
        assert_eq!(dec.finish(), "");
    }
}
