//! Regex pretokenization.
//!
//! Text is split into pretokens before BPE so that merges never cross word,
//! number, punctuation or whitespace boundaries. The split is a partition:
//! concatenating the pretokens always reproduces the input.

use fancy_regex::{Regex, RegexBuilder};

/// Default split pattern (GPT-2 style).
///
/// Alternatives, tried in order at each position:
/// - `'(?:[sdmt]|ll|ve|re)` - contraction suffixes
/// - ` ?\p{L}+` - letter run with optional leading space
/// - ` ?\p{N}+` - digit run with optional leading space
/// - ` ?[^\s\p{L}\p{N}]+` - punctuation/symbol run with optional leading space
/// - `\s+(?!\S)` - whitespace run not followed by non-whitespace
/// - `\s+` - any remaining whitespace run
pub const GPT2_PATTERN: &str =
    r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// fancy-regex's own default backtrack limit.
const DEFAULT_BACKTRACK_LIMIT: usize = 1_000_000;

/// Backtrack budget per remaining input byte when a text exceeds the default.
const BACKTRACK_STEPS_PER_BYTE: usize = 8;

/// Compiled split pattern.
#[derive(Debug, Clone)]
pub struct Pretokenizer {
    regex: Regex,
}

impl Pretokenizer {
    pub fn new(pattern: &str) -> Result<Self, fancy_regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .backtrack_limit(DEFAULT_BACKTRACK_LIMIT)
            .build()?;
        Ok(Self { regex })
    }

    /// The pattern this pretokenizer was compiled from.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Lazily split `text` into pretokens.
    ///
    /// Each call starts a fresh pass over `text`.
    pub fn split<'r, 't>(&'r self, text: &'t str) -> Pretokens<'r, 't> {
        Pretokens {
            regex: &self.regex,
            relaxed: None,
            text,
            pos: 0,
            search: 0,
            pending: None,
            exhausted: false,
        }
    }
}

/// Recompile `pattern` with a backtrack limit scaled to `remaining` bytes.
fn relaxed_regex(pattern: &str, remaining: usize) -> Result<Regex, fancy_regex::Error> {
    let limit = remaining
        .saturating_mul(BACKTRACK_STEPS_PER_BYTE)
        .max(DEFAULT_BACKTRACK_LIMIT);
    RegexBuilder::new(pattern).backtrack_limit(limit).build()
}

/// Iterator over the pretokens of one text.
///
/// Text not covered by any match (possible with custom patterns) is yielded
/// as a piece of its own. When the regex gives up on a long input it is
/// recompiled once with a backtrack limit proportional to the rest of the
/// text, and matching resumes where it failed.
pub struct Pretokens<'r, 't> {
    regex: &'r Regex,
    relaxed: Option<Regex>,
    text: &'t str,
    /// End of the last piece handed out.
    pos: usize,
    /// Where the next regex search starts.
    search: usize,
    pending: Option<(usize, usize)>,
    exhausted: bool,
}

impl<'r, 't> Pretokens<'r, 't> {
    fn next_span(&mut self) -> (usize, usize) {
        if let Some(span) = self.pending.take() {
            return span;
        }

        let end = self.text.len();
        while !self.exhausted && self.search <= end {
            let regex = self.relaxed.as_ref().unwrap_or(self.regex);
            match regex.find_from_pos(self.text, self.search) {
                Ok(Some(m)) if m.start() == m.end() => {
                    // empty matches cover nothing; step over one char
                    let step = self.text[m.end()..].chars().next().map_or(1, char::len_utf8);
                    self.search = m.end() + step;
                }
                Ok(Some(m)) => {
                    self.search = m.end();
                    return (m.start(), m.end());
                }
                Ok(None) => self.exhausted = true,
                Err(err) if self.relaxed.is_none() => {
                    let remaining = end - self.search;
                    match relaxed_regex(self.regex.as_str(), remaining) {
                        Ok(regex) => {
                            log::debug!(
                                "pretokenizer regex failed at byte {}: {err}; retrying with a larger backtrack limit",
                                self.search
                            );
                            self.relaxed = Some(regex);
                        }
                        Err(build_err) => {
                            log::warn!("cannot recompile pretokenizer regex: {build_err}");
                            self.exhausted = true;
                        }
                    }
                }
                Err(err) => {
                    log::warn!(
                        "pretokenizer regex failed at byte {}: {err}; keeping the rest as one piece",
                        self.search
                    );
                    self.exhausted = true;
                }
            }
        }

        self.exhausted = true;
        (end, end)
    }
}

impl<'r, 't> Iterator for Pretokens<'r, 't> {
    type Item = &'t str;

    fn next(&mut self) -> Option<&'t str> {
        loop {
            if self.pos >= self.text.len() {
                return None;
            }

            let (start, end) = self.next_span();

            if start > self.pos {
                self.pending = Some((start, end));
                let gap = &self.text[self.pos..start];
                self.pos = start;
                return Some(gap);
            }

            if end > self.pos {
                let piece = &self.text[self.pos..end];
                self.pos = end;
                return Some(piece);
            }
        }
    }
}
