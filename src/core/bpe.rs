//! Merge table and merge application.
//!
//! Merge rules arrive as an ordered list of byte-sequence pairs. The position
//! of a rule in that list is its *rank*: rank 0 was learned first and has the
//! highest priority. At construction the pairs are resolved against the
//! vocabulary into `(left_id, right_id) → (rank, merged_id)`.
//!
//! # Application order
//!
//! Merges are applied as a single rule-major sweep: rules are visited once
//! each in ascending rank, and every visit rewrites all non-overlapping
//! occurrences of that pair, scanning left to right. A rule whose pair only
//! appears after a later-ranked merge is therefore *not* applied.
//!
//! Visiting every rule would cost `O(rules)` per pretoken, so the sweep skips
//! rules that cannot match: it repeatedly picks the lowest-ranked pair present
//! whose rank is not below a floor, rewrites it, and moves the floor past that
//! rank. Skipped rules have no occurrences at the time they would be visited,
//! so the result is identical to the full sweep.

use rustc_hash::{FxHashMap, FxHashSet};

use super::tokenizer::TokenizerError;
use super::vocab::Vocabulary;

/// A pair of adjacent token ids.
pub type Pair = (u32, u32);

/// Resolved merge rules: pair → (rank, merged id).
#[derive(Debug, Clone, Default)]
pub struct MergeTable {
    ranks: FxHashMap<Pair, (usize, u32)>,
}

impl MergeTable {
    /// Resolve ordered byte-level merge rules against `vocab`.
    ///
    /// Rules producing an id listed in `reserved` are left out of the table;
    /// they still occupy their rank so the remaining ranks are unchanged.
    ///
    /// # Errors
    ///
    /// [`TokenizerError::UnknownMergeSymbol`] when the left side, right side,
    /// or concatenation of a rule is not a vocabulary entry.
    pub fn new<I, B>(
        rules: I,
        vocab: &Vocabulary,
        reserved: &FxHashSet<u32>,
    ) -> Result<Self, TokenizerError>
    where
        I: IntoIterator<Item = (B, B)>,
        B: AsRef<[u8]>,
    {
        let rules = rules.into_iter();
        let mut ranks =
            FxHashMap::with_capacity_and_hasher(rules.size_hint().0, Default::default());

        for (rank, (left, right)) in rules.enumerate() {
            let (left, right) = (left.as_ref(), right.as_ref());
            let merged: Vec<u8> = [left, right].concat();

            let resolve = |symbol: &[u8]| {
                vocab
                    .id_of(symbol)
                    .ok_or_else(|| TokenizerError::UnknownMergeSymbol {
                        rank,
                        symbol: symbol.to_vec(),
                    })
            };
            let pair = (resolve(left)?, resolve(right)?);
            let merged_id = resolve(&merged)?;

            if reserved.contains(&merged_id) {
                log::warn!(
                    "merge rule {rank} produces reserved special token id {merged_id}; rule ignored"
                );
                continue;
            }

            // A pair listed twice keeps its first rank.
            ranks.entry(pair).or_insert((rank, merged_id));
        }

        Ok(Self { ranks })
    }

    /// Rank and merged id of `pair`, if it is a merge rule.
    #[inline]
    pub fn get(&self, pair: Pair) -> Option<(usize, u32)> {
        self.ranks.get(&pair).copied()
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Apply every rule, in rank order, to a sequence of ids.
    pub fn apply(&self, mut ids: Vec<u32>) -> Vec<u32> {
        let mut floor = 0;

        while ids.len() > 1 {
            let Some((rank, pair, merged_id)) = self.lowest_pair(&ids, floor) else {
                break;
            };
            ids = merge_pair(&ids, pair, merged_id);
            floor = rank + 1;
        }

        ids
    }

    /// Lowest-ranked adjacent pair in `ids` whose rank is at least `floor`.
    fn lowest_pair(&self, ids: &[u32], floor: usize) -> Option<(usize, Pair, u32)> {
        ids.windows(2)
            .filter_map(|window| {
                let pair = (window[0], window[1]);
                match self.ranks.get(&pair) {
                    Some(&(rank, merged_id)) if rank >= floor => Some((rank, pair, merged_id)),
                    _ => None,
                }
            })
            .min_by_key(|&(rank, _, _)| rank)
    }
}

/// Replace every non-overlapping occurrence of `pair`, scanning left to right.
///
/// A freshly merged id is never re-examined within the same call.
fn merge_pair(ids: &[u32], pair: Pair, merged_id: u32) -> Vec<u32> {
    let mut merged = Vec::with_capacity(ids.len());
    let mut i = 0;

    while i < ids.len() {
        if i + 1 < ids.len() && (ids[i], ids[i + 1]) == pair {
            merged.push(merged_id);
            i += 2;
        } else {
            merged.push(ids[i]);
            i += 1;
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(entries: &[(u32, &str)]) -> Vocabulary {
        Vocabulary::new(entries.iter().map(|(id, s)| (*id, s.as_bytes().to_vec()))).unwrap()
    }

    fn table(vocab: &Vocabulary, rules: &[(&str, &str)]) -> MergeTable {
        MergeTable::new(
            rules.iter().map(|(l, r)| (l.as_bytes(), r.as_bytes())),
            vocab,
            &FxHashSet::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_rule() {
        let v = vocab(&[(0, "a"), (1, "b"), (2, "ab")]);
        let merges = table(&v, &[("a", "b")]);
        assert_eq!(merges.get((0, 1)), Some((0, 2)));
        assert_eq!(merges.apply(vec![0, 1]), vec![2]);
        assert_eq!(merges.apply(vec![1, 0]), vec![1, 0]);
        assert_eq!(merges.apply(vec![0, 1, 1, 0, 1]), vec![2, 1, 2]);
    }

    #[test]
    fn test_chained_rules() {
        let v = vocab(&[(0, "a"), (1, "b"), (2, "ab"), (3, "aba")]);
        let merges = table(&v, &[("a", "b"), ("ab", "a")]);
        assert_eq!(merges.apply(vec![0, 1, 0]), vec![3]);
    }

    #[test]
    fn test_rank_priority() {
        // "abc": (b,c) outranks (a,b)
        let v = vocab(&[(0, "a"), (1, "b"), (2, "c"), (3, "ab"), (4, "bc")]);
        let merges = table(&v, &[("b", "c"), ("a", "b")]);
        assert_eq!(merges.apply(vec![0, 1, 2]), vec![0, 4]);
    }

    #[test]
    fn test_non_overlapping_left_to_right() {
        let v = vocab(&[(0, "a"), (1, "aa")]);
        let merges = table(&v, &[("a", "a")]);
        assert_eq!(merges.apply(vec![0, 0, 0]), vec![1, 0]);
        assert_eq!(merges.apply(vec![0, 0, 0, 0]), vec![1, 1]);
    }

    #[test]
    fn test_rule_visited_once() {
        // (x, ab) ranks above (a, b) but only becomes adjacent afterwards.
        let v = vocab(&[(0, "a"), (1, "b"), (2, "x"), (3, "ab"), (4, "xab")]);
        let merges = table(&v, &[("x", "ab"), ("a", "b")]);
        assert_eq!(merges.apply(vec![2, 0, 1]), vec![2, 3]);
    }

    #[test]
    fn test_rule_can_reapply_to_its_own_output_rank_later() {
        // (aa, aa) ranks after (a, a), so it sees the output of the first rule.
        let v = vocab(&[(0, "a"), (1, "aa"), (2, "aaaa")]);
        let merges = table(&v, &[("a", "a"), ("aa", "aa")]);
        assert_eq!(merges.apply(vec![0, 0, 0, 0, 0]), vec![2, 0]);
    }

    #[test]
    fn test_empty_and_single() {
        let v = vocab(&[(0, "a"), (1, "b"), (2, "ab")]);
        let merges = table(&v, &[("a", "b")]);
        assert_eq!(merges.apply(vec![]), Vec::<u32>::new());
        assert_eq!(merges.apply(vec![0]), vec![0]);
    }

    #[test]
    fn test_unknown_symbol() {
        let v = vocab(&[(0, "a"), (1, "b")]);
        let err = MergeTable::new([(b"a", b"b")], &v, &FxHashSet::default()).unwrap_err();
        assert!(matches!(
            err,
            TokenizerError::UnknownMergeSymbol { rank: 0, ref symbol } if symbol == b"ab"
        ));

        let err = MergeTable::new([(b"a".as_slice(), b"q".as_slice())], &v, &FxHashSet::default())
            .unwrap_err();
        assert!(matches!(
            err,
            TokenizerError::UnknownMergeSymbol { rank: 0, ref symbol } if symbol == b"q"
        ));
    }

    #[test]
    fn test_duplicate_rule_keeps_first_rank() {
        let v = vocab(&[(0, "a"), (1, "b"), (2, "ab")]);
        let merges = table(&v, &[("a", "b"), ("a", "b")]);
        assert_eq!(merges.len(), 1);
        assert_eq!(merges.get((0, 1)), Some((0, 2)));
    }

    #[test]
    fn test_reserved_output_excluded() {
        let v = vocab(&[(0, "a"), (1, "b"), (2, "ab"), (3, "c"), (4, "bc")]);
        let reserved: FxHashSet<u32> = [2].into_iter().collect();
        let merges = MergeTable::new(
            [
                (b"a".as_slice(), b"b".as_slice()),
                (b"b".as_slice(), b"c".as_slice()),
            ],
            &v,
            &reserved,
        )
        .unwrap();
        assert_eq!(merges.get((0, 1)), None);
        assert_eq!(merges.get((1, 3)), Some((1, 4)));
        assert_eq!(merges.apply(vec![0, 1, 3]), vec![0, 4]);
    }
}
