//! rankbpe - byte-level BPE tokenizer
//!
//! Converts text to token ids and back using a fixed vocabulary and an
//! ordered list of merge rules produced by an external trainer:
//! - Regex pretokenization (GPT-2 split pattern by default)
//! - Rank-ordered merge sweep over single-byte ids
//! - Aho-Corasick longest-match special tokens
//! - Lazy streaming encode and UTF-8 safe streaming decode
//! - Rayon parallelism for batch operations

pub mod core;

pub use crate::core::{
    EncodeStream, MergeTable, Pretokenizer, SpecialTokens, StreamingDecoder, Tokenizer,
    TokenizerError, VocabError, Vocabulary, GPT2_PATTERN,
};
