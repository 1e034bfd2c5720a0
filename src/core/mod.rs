//! Core tokenization engine for rankbpe.
//!
//! # Architecture
//!
//! - [`Vocabulary`]: id ↔ byte-sequence bijection
//! - [`MergeTable`]: ranked merge rules and the merge sweep
//! - [`Pretokenizer`]: regex split into pretokens (merges never cross them)
//! - [`SpecialTokens`]: reserved literals with a leftmost-longest matcher
//! - [`Tokenizer`]: the engine tying the above together (encode/decode,
//!   Rayon batch operations)
//! - [`EncodeStream`] / [`StreamingDecoder`]: incremental encode and
//!   UTF-8 safe incremental decode
//!
//! Everything is immutable after construction; a [`Tokenizer`] can be
//! shared across threads by reference.

mod bpe;
mod pretokenizer;
mod special;
mod streaming;
mod tokenizer;
mod vocab;

pub use bpe::{MergeTable, Pair};
pub use pretokenizer::{Pretokenizer, Pretokens, GPT2_PATTERN};
pub use special::{Segment, Segments, SpecialTokens};
pub use streaming::{EncodeStream, StreamingDecoder};
pub use tokenizer::{Tokenizer, TokenizerError};
pub use vocab::{VocabError, Vocabulary};
