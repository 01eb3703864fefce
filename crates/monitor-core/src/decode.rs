//! Incremental UTF-8 decoding for raw output chunks.
//!
//! Pipes and files hand back arbitrary byte slices, so a multi-byte character
//! can straddle two reads. [`Utf8Chunker`] holds back an incomplete trailing
//! sequence until the next read completes it. Bytes that can never form valid
//! UTF-8 are replaced with U+FFFD.

/// Longest possible UTF-8 encoding of one character.
const MAX_CHAR_LEN: usize = 4;

#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` together with anything held back from the last call.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let buf = std::mem::take(&mut self.pending);

        let mut out = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    // Checked by from_utf8 above.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[bad..];
                        }
                        None => {
                            // Truncated sequence at the end: wait for more.
                            if tail.len() < MAX_CHAR_LEN {
                                self.pending.extend_from_slice(tail);
                            } else {
                                out.push(char::REPLACEMENT_CHARACTER);
                            }
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is held back, lossily. Used at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }
}
