//! Special-token registry and splitting.
//!
//! Special tokens are literal strings that always map to a single reserved id
//! and are never decomposed by BPE. Before pretokenization the input text is
//! cut into ordinary spans and special-token spans with an Aho-Corasick
//! automaton in leftmost-longest mode, so when one literal is a prefix of
//! another (`<|a|>` and `<|a|>x`) the longer one wins.

use aho_corasick::{AhoCorasick, FindIter, MatchKind};
use rustc_hash::FxHashMap;

/// Registered special tokens and their matcher.
#[derive(Debug, Clone, Default)]
pub struct SpecialTokens {
    ids: FxHashMap<String, u32>,
    /// Literals sorted by descending length; ties keep registration order.
    literals: Vec<String>,
    /// Id of `literals[i]`, indexed by automaton pattern id.
    pattern_ids: Vec<u32>,
    matcher: Option<AhoCorasick>,
}

impl SpecialTokens {
    /// Build the registry from `(literal, id)` pairs.
    ///
    /// Later duplicates of a literal are ignored.
    pub fn new<I>(tokens: I) -> Result<Self, aho_corasick::BuildError>
    where
        I: IntoIterator<Item = (String, u32)>,
    {
        let mut ids = FxHashMap::default();
        let mut ordered = Vec::new();
        for (literal, id) in tokens {
            if !ids.contains_key(&literal) {
                ids.insert(literal.clone(), id);
                ordered.push((literal, id));
            }
        }

        // stable sort keeps registration order among equal lengths
        ordered.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        let (literals, pattern_ids): (Vec<String>, Vec<u32>) = ordered.into_iter().unzip();

        let matcher = if literals.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&literals)?,
            )
        };

        Ok(Self {
            ids,
            literals,
            pattern_ids,
            matcher,
        })
    }

    /// Reserved id of `literal`.
    pub fn id(&self, literal: &str) -> Option<u32> {
        self.ids.get(literal).copied()
    }

    pub fn contains_id(&self, id: u32) -> bool {
        self.pattern_ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// `(literal, id)` pairs, longest literal first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.literals
            .iter()
            .map(String::as_str)
            .zip(self.pattern_ids.iter().copied())
    }

    /// Split `text` into ordinary and special-token segments, in order.
    ///
    /// Empty ordinary spans are never produced.
    pub fn split<'s, 't>(&'s self, text: &'t str) -> Segments<'s, 't> {
        Segments {
            text,
            pattern_ids: &self.pattern_ids,
            matches: self.matcher.as_ref().map(|m| m.find_iter(text)),
            pos: 0,
            pending: None,
        }
    }
}

/// A piece of input text after special-token splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'t> {
    /// Text to be pretokenized and merged.
    Text(&'t str),
    /// An exact special-token literal and its reserved id.
    Special { literal: &'t str, id: u32 },
}

/// Iterator returned by [`SpecialTokens::split`].
pub struct Segments<'s, 't> {
    text: &'t str,
    pattern_ids: &'s [u32],
    matches: Option<FindIter<'s, 't>>,
    pos: usize,
    pending: Option<Segment<'t>>,
}

impl<'s, 't> Iterator for Segments<'s, 't> {
    type Item = Segment<'t>;

    fn next(&mut self) -> Option<Segment<'t>> {
        if let Some(segment) = self.pending.take() {
            return Some(segment);
        }
        if self.pos >= self.text.len() {
            return None;
        }

        let found = self.matches.as_mut().and_then(Iterator::next);
        let Some(m) = found else {
            let rest = &self.text[self.pos..];
            self.pos = self.text.len();
            return Some(Segment::Text(rest));
        };

        let special = Segment::Special {
            literal: &self.text[m.start()..m.end()],
            id: self.pattern_ids[m.pattern().as_usize()],
        };
        let start = self.pos;
        self.pos = m.end();

        if m.start() > start {
            self.pending = Some(special);
            Some(Segment::Text(&self.text[start..m.start()]))
        } else {
            Some(special)
        }
    }
}
