//! Fixed-width 256-bit set used for component and tag signatures.
//!
//! A [`BitSet`] is four `u64` words. All operations are branch-light word
//! loops, the type is `Copy`, and iterating the set indices never allocates.
//!
//! Indices must be `< 256`. Out-of-range indices are a caller contract
//! violation: the unchecked setters `debug_assert!` on them, and
//! [`BitSet::try_set_bit`] reports them as [`BitSetError`].

use std::fmt;

use crate::engine::error::BitSetError;

/// Number of bits in a [`BitSet`].
pub const BITSET_BITS: usize = 256;

const WORDS: usize = BITSET_BITS / 64;

/// 256-bit membership set.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: [u64; WORDS],
}

impl BitSet {
    /// Empty set.
    #[inline]
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Builds a set from raw words, lowest bits first.
    #[inline]
    pub const fn from_words(words: [u64; WORDS]) -> Self {
        Self { words }
    }

    /// Builds a set containing every index in `indices`.
    pub fn from_indices(indices: &[usize]) -> Self {
        let mut set = Self::new();
        for &index in indices {
            set.set_bit(index);
        }
        set
    }

    /// Raw words, lowest bits first.
    #[inline]
    pub const fn words(&self) -> &[u64; WORDS] {
        &self.words
    }

    /// Adds `index` to the set.
    #[inline]
    pub fn set_bit(&mut self, index: usize) {
        debug_assert!(index < BITSET_BITS, "bit index {index} out of range");
        self.words[index >> 6] |= 1u64 << (index & 63);
    }

    /// Adds `index` to the set, rejecting indices outside `0..256`.
    pub fn try_set_bit(&mut self, index: usize) -> Result<(), BitSetError> {
        if index >= BITSET_BITS {
            return Err(BitSetError::IndexOutOfRange { index });
        }
        self.set_bit(index);
        Ok(())
    }

    /// Removes `index` from the set.
    #[inline]
    pub fn clear_bit(&mut self, index: usize) {
        debug_assert!(index < BITSET_BITS, "bit index {index} out of range");
        self.words[index >> 6] &= !(1u64 << (index & 63));
    }

    /// Returns `true` if `index` is in the set. Out-of-range indices are never members.
    #[inline]
    pub fn has(&self, index: usize) -> bool {
        if index >= BITSET_BITS {
            return false;
        }
        (self.words[index >> 6] >> (index & 63)) & 1 == 1
    }

    /// Returns `true` if every member of `other` is a member of `self`.
    #[inline]
    pub fn has_all(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *b)
    }

    /// Returns `true` if `self` and `other` share at least one member.
    #[inline]
    pub fn has_any(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of members.
    #[inline]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// `self ∪ other`
    #[inline]
    pub fn union(&self, other: &BitSet) -> BitSet {
        let mut words = self.words;
        for (w, o) in words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
        BitSet { words }
    }

    /// `self ∩ other`
    #[inline]
    pub fn intersect(&self, other: &BitSet) -> BitSet {
        let mut words = self.words;
        for (w, o) in words.iter_mut().zip(other.words.iter()) {
            *w &= o;
        }
        BitSet { words }
    }

    /// `self \ other`
    #[inline]
    pub fn difference(&self, other: &BitSet) -> BitSet {
        let mut words = self.words;
        for (w, o) in words.iter_mut().zip(other.words.iter()) {
            *w &= !o;
        }
        BitSet { words }
    }

    /// Members present in `new` but not in `old`.
    #[inline]
    pub fn added(old: &BitSet, new: &BitSet) -> BitSet {
        new.difference(old)
    }

    /// Members present in `old` but not in `new`.
    #[inline]
    pub fn removed(old: &BitSet, new: &BitSet) -> BitSet {
        old.difference(new)
    }

    /// Members present in exactly one of `old` and `new`.
    #[inline]
    pub fn changed(old: &BitSet, new: &BitSet) -> BitSet {
        let mut words = old.words;
        for (w, n) in words.iter_mut().zip(new.words.iter()) {
            *w ^= n;
        }
        BitSet { words }
    }

    /// Deterministic 64-bit hash of the four words.
    ///
    /// Each word is multiplied by a distinct odd constant before mixing so
    /// that sets differing only in which word holds a bit do not collide.
    pub fn hash64(&self) -> u64 {
        const K: [u64; WORDS] = [
            0x9E37_79B9_7F4A_7C15,
            0xC2B2_AE3D_27D4_EB4F,
            0x1656_67B1_9E37_79F9,
            0x27D4_EB2F_1656_67C5,
        ];
        let mut hash = 0xCBF2_9CE4_8422_2325u64;
        for (word, k) in self.words.iter().zip(K.iter()) {
            hash ^= word.wrapping_mul(*k);
            hash = hash.rotate_left(27).wrapping_mul(0x0000_0100_0000_01B3);
        }
        hash
    }

    /// Iterates member indices in ascending order.
    #[inline]
    pub fn iter(&self) -> BitSetIter {
        BitSetIter { words: self.words, word: 0 }
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = usize;
    type IntoIter = BitSetIter;

    fn into_iter(self) -> BitSetIter {
        self.iter()
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::new();
        for index in iter {
            set.set_bit(index);
        }
        set
    }
}

/// Ascending iterator over the members of a [`BitSet`]. Holds a copy of the
/// words so it does not borrow the set.
#[derive(Clone, Debug)]
pub struct BitSetIter {
    words: [u64; WORDS],
    word: usize,
}

impl Iterator for BitSetIter {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        while self.word < WORDS {
            let bits = self.words[self.word];
            if bits != 0 {
                let tz = bits.trailing_zeros() as usize;
                self.words[self.word] = bits & (bits - 1);
                return Some(self.word * 64 + tz);
            }
            self.word += 1;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: usize = self.words[self.word.min(WORDS)..]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BitSetIter {}
