use rayon::prelude::*;
use rustc_hash::FxHashSet;
use thiserror::Error;

use super::bpe::MergeTable;
use super::pretokenizer::{Pretokenizer, GPT2_PATTERN};
use super::special::{Segment, SpecialTokens};
use super::streaming::EncodeStream;
use super::vocab::{VocabError, Vocabulary};

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Vocabulary error: {0}")]
    Vocab(#[from] VocabError),
    #[error("Merge rule {rank} references {symbol:?}, which is not in the vocabulary")]
    UnknownMergeSymbol { rank: usize, symbol: Vec<u8> },
    #[error("Unknown token id: {0}")]
    UnknownTokenId(u32),
    #[error("Decoding error: invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Regex compilation error: {0}")]
    Regex(#[from] Box<fancy_regex::Error>),
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasick(#[from] aho_corasick::BuildError),
}

impl From<fancy_regex::Error> for TokenizerError {
    fn from(err: fancy_regex::Error) -> Self {
        Self::Regex(Box::new(err))
    }
}

/// Byte-level BPE tokenizer.
///
/// Built once from a vocabulary, an ordered merge list and an optional list of
/// special tokens; immutable afterwards. All methods take `&self`, so one
/// instance can be shared across threads without locking.
///
/// # Encoding pipeline
///
/// 1. Split the text on special-token literals (longest match first).
/// 2. Emit the reserved id of each special token.
/// 3. Pretokenize the remaining spans with the split pattern.
/// 4. Map every byte of a pretoken to its single-byte id.
/// 5. Apply the merge rules in rank order (see [`MergeTable::apply`]).
///
/// # Decoding
///
/// [`decode`](Self::decode) is strict: unknown ids and invalid UTF-8 are
/// errors. [`decode_lossy`](Self::decode_lossy) replaces each invalid UTF-8
/// run with U+FFFD but still rejects unknown ids.
///
/// # Example
///
/// ```
/// use rankbpe::Tokenizer;
/// use rustc_hash::FxHashMap;
///
/// let mut vocab = FxHashMap::default();
/// vocab.insert(0, b"a".to_vec());
/// vocab.insert(1, b"b".to_vec());
/// vocab.insert(2, b"ab".to_vec());
///
/// let merges = vec![(b"a".to_vec(), b"b".to_vec())];
/// let tokenizer = Tokenizer::new(vocab, merges, &["<eos>"]).unwrap();
///
/// assert_eq!(tokenizer.encode("ab<eos>ba"), vec![2, 3, 1, 0]);
/// assert_eq!(tokenizer.decode(&[2, 1, 0]).unwrap(), "abba");
/// ```
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vocabulary,
    merges: MergeTable,
    special_tokens: SpecialTokens,
    byte_ids: [Option<u32>; 256],
    pretokenizer: Pretokenizer,
}

impl Tokenizer {
    /// Create a tokenizer using the default split pattern ([`GPT2_PATTERN`]).
    ///
    /// # Arguments
    /// * `vocab` - Token id to byte sequence table
    /// * `merges` - Merge rules as byte-sequence pairs, highest priority first
    /// * `special_tokens` - Literals that must always encode to a single id
    pub fn new<V, B>(
        vocab: V,
        merges: Vec<(B, B)>,
        special_tokens: &[&str],
    ) -> Result<Self, TokenizerError>
    where
        V: IntoIterator<Item = (u32, Vec<u8>)>,
        B: AsRef<[u8]>,
    {
        Self::with_pattern(vocab, merges, special_tokens, GPT2_PATTERN)
    }

    /// Create a tokenizer with a custom pretokenization pattern.
    ///
    /// Special tokens missing from `vocab` are appended in declaration order
    /// with ids `max id + 1`, `max id + 2`, ... A special token whose bytes
    /// already are a vocabulary entry reuses that entry's id.
    pub fn with_pattern<V, B>(
        vocab: V,
        merges: Vec<(B, B)>,
        special_tokens: &[&str],
        pattern: &str,
    ) -> Result<Self, TokenizerError>
    where
        V: IntoIterator<Item = (u32, Vec<u8>)>,
        B: AsRef<[u8]>,
    {
        let mut vocab = Vocabulary::new(vocab)?;

        let mut registered = Vec::with_capacity(special_tokens.len());
        for &literal in special_tokens {
            if literal.is_empty() {
                log::warn!("ignoring empty special token");
                continue;
            }
            let id = match vocab.id_of(literal.as_bytes()) {
                Some(id) => id,
                None => {
                    let id = vocab.push(literal.as_bytes().to_vec())?;
                    log::debug!("registered special token {literal:?} as id {id}");
                    id
                }
            };
            registered.push((literal.to_string(), id));
        }

        let reserved: FxHashSet<u32> = registered.iter().map(|(_, id)| *id).collect();
        let special_tokens = SpecialTokens::new(registered)?;
        let merges = MergeTable::new(merges, &vocab, &reserved)?;
        let byte_ids = vocab.byte_table();
        let pretokenizer = Pretokenizer::new(pattern)?;

        let missing_bytes = byte_ids.iter().filter(|id| id.is_none()).count();
        if missing_bytes > 0 {
            log::debug!("{missing_bytes} byte values have no single-byte token");
        }
        log::debug!(
            "tokenizer ready: {} tokens, {} merges, {} special tokens",
            vocab.len(),
            merges.len(),
            special_tokens.len()
        );

        Ok(Self {
            vocab,
            merges,
            special_tokens,
            byte_ids,
            pretokenizer,
        })
    }

    /// Encode text to token ids, mapping special-token literals to their ids.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut result = Vec::with_capacity(text.len() / 2);

        for segment in self.special_tokens.split(text) {
            match segment {
                Segment::Special { id, .. } => result.push(id),
                Segment::Text(span) => self.encode_ordinary_into(span, &mut result),
            }
        }

        result
    }

    /// Encode text to token ids, treating special-token literals as plain text.
    pub fn encode_ordinary(&self, text: &str) -> Vec<u32> {
        let mut result = Vec::with_capacity(text.len() / 2);
        self.encode_ordinary_into(text, &mut result);
        result
    }

    fn encode_ordinary_into(&self, text: &str, out: &mut Vec<u32>) {
        for piece in self.pretokenizer.split(text) {
            out.extend(self.encode_piece(piece));
        }
    }

    /// Encode one pretoken: bytes to single-byte ids, then merges.
    fn encode_piece(&self, piece: &str) -> Vec<u32> {
        let ids: Vec<u32> = piece
            .bytes()
            .filter_map(|byte| self.byte_ids[byte as usize])
            .collect();
        let skipped = piece.len() - ids.len();
        if skipped > 0 {
            log::warn!(
                "{skipped} of {} pretoken bytes have no single-byte token; skipped",
                piece.len()
            );
        }
        self.merges.apply(ids)
    }

    /// Encode text using Rayon to merge pretokens in parallel.
    ///
    /// Produces the same ids as [`encode`](Self::encode). Only beneficial for
    /// very large texts.
    pub fn encode_rayon(&self, text: &str) -> Vec<u32> {
        enum Piece<'t> {
            Special(u32),
            Text(&'t str),
        }

        let mut pieces = Vec::new();
        for segment in self.special_tokens.split(text) {
            match segment {
                Segment::Special { id, .. } => pieces.push(Piece::Special(id)),
                Segment::Text(span) => pieces.extend(self.pretokenizer.split(span).map(Piece::Text)),
            }
        }

        let results: Vec<Vec<u32>> = pieces
            .par_iter()
            .map(|piece| match piece {
                Piece::Special(id) => vec![*id],
                Piece::Text(text) => self.encode_piece(text),
            })
            .collect();

        results.into_iter().flatten().collect()
    }

    /// Lazily encode a sequence of texts.
    ///
    /// The returned iterator yields the concatenation of
    /// [`encode`](Self::encode) for each text, pulling the next text only once
    /// the ids of the previous one have been consumed.
    pub fn encode_stream<I>(&self, texts: I) -> EncodeStream<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        EncodeStream::new(self, texts.into_iter())
    }

    /// Batch encode multiple texts in parallel.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Batch encode multiple texts in parallel, ignoring special tokens.
    pub fn encode_batch_ordinary(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts
            .par_iter()
            .map(|text| self.encode_ordinary(text))
            .collect()
    }

    /// Decode token ids to their concatenated bytes.
    pub fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>, TokenizerError> {
        let mut result = Vec::with_capacity(tokens.len() * 4);

        for &token in tokens {
            let bytes = self
                .vocab
                .bytes_of(token)
                .ok_or(TokenizerError::UnknownTokenId(token))?;
            result.extend_from_slice(bytes);
        }

        Ok(result)
    }

    /// Decode token ids to a string.
    ///
    /// Fails with [`TokenizerError::InvalidUtf8`] when the bytes are not valid
    /// UTF-8, which can happen for id sequences not produced by `encode`.
    pub fn decode(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Decode token ids to a string, replacing invalid UTF-8 with U+FFFD.
    pub fn decode_lossy(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Batch decode multiple token lists in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    /// Number of vocabulary entries, special tokens included.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn merges(&self) -> &MergeTable {
        &self.merges
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    /// The pretokenization pattern in use.
    pub fn pattern(&self) -> &str {
        self.pretokenizer.pattern()
    }

    pub fn token_id(&self, bytes: &[u8]) -> Option<u32> {
        self.vocab.id_of(bytes)
    }

    pub fn token_bytes(&self, id: u32) -> Option<&[u8]> {
        self.vocab.bytes_of(id)
    }

    pub fn special_token_id(&self, literal: &str) -> Option<u32> {
        self.special_tokens.id(literal)
    }

    pub fn is_special_id(&self, id: u32) -> bool {
        self.special_tokens.contains_id(id)
    }
}
