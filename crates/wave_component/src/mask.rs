//! Runtime-sized bitsets.
//!
//! Every resource set the scheduler reasons about (read, write, without, any,
//! archetype signatures, the enabled-system mask) is a [`BitSet`] indexed by a
//! small dense integer. Storage grows in `u64` words as higher bits are set,
//! so the number of registered component types is never fixed at compile time.

use std::fmt;

use serde::{Deserialize, Serialize};

const WORD_BITS: usize = u64::BITS as usize;

/// A growable set of small non-negative integers.
///
/// The word vector never ends in a zero word, so two sets holding the same
/// bits compare and hash equal regardless of how they were built, including
/// sets read back from serialized data.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Words")]
pub struct BitSet {
    words: Vec<u64>,
}

/// Serialized form; may carry trailing zero words.
#[derive(Deserialize)]
struct Words {
    words: Vec<u64>,
}

impl From<Words> for BitSet {
    fn from(Words { words }: Words) -> Self {
        let mut set = Self { words };
        set.trim();
        set
    }
}

impl BitSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Insert `bit`. Returns `true` if it was not already present.
    pub fn insert(&mut self, bit: usize) -> bool {
        let (word, mask) = locate(bit);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    /// Remove `bit`. Returns `true` if it was present.
    pub fn remove(&mut self, bit: usize) -> bool {
        let (word, mask) = locate(bit);
        let Some(slot) = self.words.get_mut(word) else {
            return false;
        };
        let present = *slot & mask != 0;
        *slot &= !mask;
        self.trim();
        present
    }

    /// Returns `true` if `bit` is in the set.
    #[must_use]
    pub fn contains(&self, bit: usize) -> bool {
        let (word, mask) = locate(bit);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Number of bits set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns `true` if the two sets share at least one bit.
    #[must_use]
    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Returns `true` if the two sets share no bit.
    #[must_use]
    pub fn is_disjoint(&self, other: &BitSet) -> bool {
        !self.intersects(other)
    }

    /// Returns `true` if every bit of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &BitSet) -> bool {
        self.words.iter().enumerate().all(|(i, &w)| {
            let theirs = other.words.get(i).copied().unwrap_or(0);
            w & !theirs == 0
        })
    }

    /// Add every bit of `other` to `self`.
    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    /// The bits present in both sets.
    #[must_use]
    pub fn intersection(&self, other: &BitSet) -> BitSet {
        let mut out = BitSet {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(a, b)| a & b)
                .collect(),
        };
        out.trim();
        out
    }

    /// Iterate set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let offset = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * WORD_BITS + offset)
            })
        })
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

const fn locate(bit: usize) -> (usize, u64) {
    (bit / WORD_BITS, 1u64 << (bit % WORD_BITS))
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<usize> for BitSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for bit in iter {
            self.insert(bit);
        }
    }
}
