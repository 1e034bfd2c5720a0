//! Token vocabulary: a bijection between token ids and byte sequences.
//!
//! The vocabulary is handed over by an external trainer as an `id → bytes`
//! table. Both directions are materialized so that encoding (bytes → id) and
//! decoding (id → bytes) are a single hash lookup each.
//!
//! # Invariants
//!
//! - every id maps to exactly one byte sequence
//! - every byte sequence maps back to exactly one id
//!
//! A table violating either invariant is rejected with a [`VocabError`].
//! The only way to grow a vocabulary is [`Vocabulary::push`], which assigns
//! `max id + 1`. The engine uses it while registering special tokens and
//! never mutates the vocabulary afterwards.

use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors that can occur when building a vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VocabError {
    #[error("byte sequence {bytes:?} is mapped by both id {first} and id {second}")]
    DuplicateByteSequence { bytes: Vec<u8>, first: u32, second: u32 },
    #[error("token id {0} is listed more than once")]
    DuplicateTokenId(u32),
    #[error("no token id left to assign above u32::MAX")]
    IdSpaceExhausted,
}

/// Bidirectional `id ↔ bytes` table.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    encoder: FxHashMap<Vec<u8>, u32>,
    decoder: FxHashMap<u32, Vec<u8>>,
    max_id: Option<u32>,
}

impl Vocabulary {
    /// Build a vocabulary from `(id, bytes)` entries.
    ///
    /// Entries are processed in ascending id order, so when two ids share a
    /// byte sequence the error reports the lower id as `first`.
    pub fn new<I>(table: I) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = (u32, Vec<u8>)>,
    {
        let mut entries: Vec<(u32, Vec<u8>)> = table.into_iter().collect();
        entries.sort_by_key(|(id, _)| *id);

        let mut vocab = Self {
            encoder: FxHashMap::with_capacity_and_hasher(entries.len(), Default::default()),
            decoder: FxHashMap::with_capacity_and_hasher(entries.len(), Default::default()),
            max_id: None,
        };

        for (id, bytes) in entries {
            vocab.insert(id, bytes)?;
        }

        Ok(vocab)
    }

    /// Append `bytes` under the next free id (`max id + 1`, or 0 when empty).
    pub fn push(&mut self, bytes: Vec<u8>) -> Result<u32, VocabError> {
        let id = match self.max_id {
            None => 0,
            Some(max) => max.checked_add(1).ok_or(VocabError::IdSpaceExhausted)?,
        };
        self.insert(id, bytes)?;
        Ok(id)
    }

    fn insert(&mut self, id: u32, bytes: Vec<u8>) -> Result<(), VocabError> {
        if self.decoder.contains_key(&id) {
            return Err(VocabError::DuplicateTokenId(id));
        }
        if let Some(&first) = self.encoder.get(&bytes) {
            return Err(VocabError::DuplicateByteSequence {
                bytes,
                first,
                second: id,
            });
        }

        self.encoder.insert(bytes.clone(), id);
        self.decoder.insert(id, bytes);
        self.max_id = Some(self.max_id.map_or(id, |max| max.max(id)));
        Ok(())
    }

    /// Id of a byte sequence, if it is a vocabulary entry.
    #[inline]
    pub fn id_of(&self, bytes: &[u8]) -> Option<u32> {
        self.encoder.get(bytes).copied()
    }

    /// Byte sequence of an id, if the id is a vocabulary entry.
    #[inline]
    pub fn bytes_of(&self, id: u32) -> Option<&[u8]> {
        self.decoder.get(&id).map(Vec::as_slice)
    }

    /// Whether `id` is a vocabulary entry.
    pub fn contains_id(&self, id: u32) -> bool {
        self.decoder.contains_key(&id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.decoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoder.is_empty()
    }

    /// Largest id in use, `None` for an empty vocabulary.
    pub fn max_id(&self) -> Option<u32> {
        self.max_id
    }

    /// Iterate over `(id, bytes)` entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.decoder.iter().map(|(id, bytes)| (*id, bytes.as_slice()))
    }

    /// Table of single-byte ids, indexed by byte value.
    pub(crate) fn byte_table(&self) -> [Option<u32>; 256] {
        let mut table = [None; 256];
        for (slot, byte) in table.iter_mut().zip(0u8..=255) {
            *slot = self.id_of(&[byte]);
        }
        table
    }
}
