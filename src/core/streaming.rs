//! Incremental encoding and decoding.
//!
//! - [`EncodeStream`] lazily encodes a (possibly unbounded) sequence of texts,
//!   so corpora larger than memory can be tokenized without materializing the
//!   whole output.
//! - [`StreamingDecoder`] turns token ids into text one token at a time and
//!   only ever emits complete UTF-8 characters. This matters for LLM output,
//!   where a token boundary may fall inside a multi-byte character.

use super::tokenizer::{Tokenizer, TokenizerError};

/// Lazy iterator of token ids over a sequence of texts.
///
/// Created by [`Tokenizer::encode_stream`]. Yields exactly the ids of
/// `encode(t)` for each text `t`, in order. A text is pulled from the input
/// only when every id of the previous text has been consumed.
pub struct EncodeStream<'a, I> {
    tokenizer: &'a Tokenizer,
    texts: I,
    current: std::vec::IntoIter<u32>,
}

impl<'a, I> EncodeStream<'a, I> {
    pub(crate) fn new(tokenizer: &'a Tokenizer, texts: I) -> Self {
        Self {
            tokenizer,
            texts,
            current: Vec::new().into_iter(),
        }
    }
}

impl<'a, I> Iterator for EncodeStream<'a, I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some(id) = self.current.next() {
                return Some(id);
            }
            let text = self.texts.next()?;
            self.current = self.tokenizer.encode(text.as_ref()).into_iter();
        }
    }
}

/// A streaming decoder that handles incomplete UTF-8 sequences across token boundaries.
///
/// Bytes that end in the middle of a multi-byte character are buffered until
/// the character is complete. Bytes that can never form a valid character are
/// replaced with U+FFFD, one per invalid run, matching
/// [`Tokenizer::decode_lossy`].
///
/// # Example
///
/// ```
/// use rankbpe::{StreamingDecoder, Tokenizer};
///
/// let vocab = (0u8..=255).map(|b| (b as u32, vec![b]));
/// let tokenizer = Tokenizer::new(vocab, Vec::<(Vec<u8>, Vec<u8>)>::new(), &[]).unwrap();
/// let mut decoder = StreamingDecoder::new(&tokenizer);
///
/// // "é" is 0xC3 0xA9
/// assert_eq!(decoder.add_token(0xC3).unwrap(), None);
/// assert_eq!(decoder.add_token(0xA9).unwrap(), Some("é".to_string()));
/// assert_eq!(decoder.flush(), "");
/// ```
pub struct StreamingDecoder<'a> {
    tokenizer: &'a Tokenizer,
    buffer: Vec<u8>,
}

impl<'a> StreamingDecoder<'a> {
    /// Create a new streaming decoder for the given tokenizer.
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            buffer: Vec::with_capacity(16),
        }
    }

    /// Add a token and return any complete UTF-8 characters.
    ///
    /// Returns `Ok(None)` while the buffered bytes are still an incomplete
    /// character. An unknown id is an error and leaves the buffer untouched.
    pub fn add_token(&mut self, token_id: u32) -> Result<Option<String>, TokenizerError> {
        let bytes = self
            .tokenizer
            .token_bytes(token_id)
            .ok_or(TokenizerError::UnknownTokenId(token_id))?;
        self.buffer.extend_from_slice(bytes);
        Ok(self.extract_complete_utf8())
    }

    /// Add multiple tokens at once and return complete UTF-8 characters.
    ///
    /// All ids are checked before any byte is buffered.
    pub fn add_tokens(&mut self, token_ids: &[u32]) -> Result<Option<String>, TokenizerError> {
        let bytes = self.tokenizer.decode_bytes(token_ids)?;
        self.buffer.extend_from_slice(&bytes);
        Ok(self.extract_complete_utf8())
    }

    /// Flush any remaining buffered bytes.
    ///
    /// An incomplete trailing sequence is replaced with U+FFFD.
    pub fn flush(&mut self) -> String {
        let result = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        result
    }

    /// Reset the decoder state, discarding any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Check if there are buffered bytes waiting for completion.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Get the number of pending bytes in the buffer.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Drain everything but a possibly incomplete trailing character.
    fn extract_complete_utf8(&mut self) -> Option<String> {
        let mut text = String::new();
        let mut rest: &[u8] = &self.buffer;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[invalid..];
                        }
                        // unexpected end of input: keep it for the next token
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.buffer.len() - rest.len();
        self.buffer.drain(..consumed);

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
