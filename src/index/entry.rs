//! Packed index entries.
//!
//! Every partial line is described by one 64-bit word holding its starting
//! byte offset in the high bits and a set of status and term-match flags in
//! the low bits:
//!
//! ```text
//!  63                                24 23            4 3        0
//! +------------------------------------+---------------+----------+
//! |            byte offset             |  term bits    |  status  |
//! +------------------------------------+---------------+----------+
//! ```

/// Number of status bits at the bottom of the word
pub const STATUS_BITS: u32 = 4;

/// Number of term-match bits (one per live search term)
pub const TERM_BITS: u32 = 20;

/// Total number of low bits reserved for flags
pub const FLAGS_WIDTH: u32 = STATUS_BITS + TERM_BITS;

/// Largest byte offset an entry can address (1 TiB - 1)
pub const MAX_OFFSET: u64 = (1u64 << (64 - FLAGS_WIDTH)) - 1;

const FLAGS_MASK: u64 = (1u64 << FLAGS_WIDTH) - 1;
const TERM_MASK: u64 = ((1u64 << TERM_BITS) - 1) << STATUS_BITS;

/// Bit mask over the term bits of an entry, indexed by term bit number (0..20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TermMask(pub u32);

impl TermMask {
    pub const EMPTY: TermMask = TermMask(0);

    #[inline]
    pub fn single(bit: u8) -> Self {
        debug_assert!((bit as u32) < TERM_BITS);
        TermMask(1 << bit)
    }

    #[inline]
    pub fn contains(self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    #[inline]
    pub fn insert(&mut self, bit: u8) {
        self.0 |= 1 << bit;
    }

    #[inline]
    pub fn remove(&mut self, bit: u8) {
        self.0 &= !(1 << bit);
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_subset_of(self, other: TermMask) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..TERM_BITS as u8).filter(move |&b| self.contains(b))
    }

    #[inline]
    fn to_entry_bits(self) -> u64 {
        (self.0 as u64) << STATUS_BITS
    }
}

/// One packed index word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PackedEntry(u64);

impl PackedEntry {
    /// Partial line that does not start its logical line
    pub const CONTINUATION: u64 = 1 << 0;
    /// Entry passed the most recent search
    pub const MATCHED: u64 = 1 << 1;
    /// Entry is part of the user selection
    pub const SELECTED: u64 = 1 << 2;
    /// All pending term bits of the current search are valid for this entry
    pub const ALL_EVALUATED: u64 = 1 << 3;

    #[inline]
    pub fn new(offset: u64, continuation: bool) -> Self {
        debug_assert!(offset <= MAX_OFFSET, "offset {offset} exceeds packed range");
        let mut word = offset << FLAGS_WIDTH;
        if continuation {
            word |= Self::CONTINUATION;
        }
        PackedEntry(word)
    }

    #[inline]
    pub fn from_raw(word: u64) -> Self {
        PackedEntry(word)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn offset(self) -> u64 {
        self.0 >> FLAGS_WIDTH
    }

    #[inline]
    pub fn flags(self) -> u64 {
        self.0 & FLAGS_MASK
    }

    #[inline]
    pub fn has(self, flag: u64) -> bool {
        self.0 & flag != 0
    }

    #[inline]
    pub fn set(&mut self, flag: u64, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    #[inline]
    pub fn is_continuation(self) -> bool {
        self.has(Self::CONTINUATION)
    }

    #[inline]
    pub fn is_matched(self) -> bool {
        self.has(Self::MATCHED)
    }

    #[inline]
    pub fn is_selected(self) -> bool {
        self.has(Self::SELECTED)
    }

    #[inline]
    pub fn all_evaluated(self) -> bool {
        self.has(Self::ALL_EVALUATED)
    }

    /// Term bits of this entry as a mask
    #[inline]
    pub fn terms(self) -> TermMask {
        TermMask(((self.0 & TERM_MASK) >> STATUS_BITS) as u32)
    }

    #[inline]
    pub fn term(self, bit: u8) -> bool {
        self.terms().contains(bit)
    }

    #[inline]
    pub fn set_term(&mut self, bit: u8, on: bool) {
        let flag = TermMask::single(bit).to_entry_bits();
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    /// Clear every term bit in `mask` plus the given status flags
    #[inline]
    pub fn clear(&mut self, mask: TermMask, status: u64) {
        self.0 &= !(mask.to_entry_bits() | (status & ((1 << STATUS_BITS) - 1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_roundtrip_keeps_flags_apart() {
        let mut e = PackedEntry::new(123_456_789, true);
        e.set(PackedEntry::MATCHED, true);
        e.set_term(0, true);
        e.set_term(19, true);

        assert_eq!(e.offset(), 123_456_789);
        assert!(e.is_continuation());
        assert!(e.is_matched());
        assert!(!e.is_selected());
        assert!(e.term(0));
        assert!(e.term(19));
        assert!(!e.term(7));
        assert_eq!(e.terms(), TermMask((1 << 0) | (1 << 19)));
    }

    #[test]
    fn test_max_offset() {
        let e = PackedEntry::new(MAX_OFFSET, false);
        assert_eq!(e.offset(), MAX_OFFSET);
        assert_eq!(e.flags(), 0);
        assert_eq!(MAX_OFFSET, (1u64 << 40) - 1);
    }

    #[test]
    fn test_clear_leaves_other_bits() {
        let mut e = PackedEntry::new(10, true);
        e.set_term(2, true);
        e.set_term(3, true);
        e.set(PackedEntry::MATCHED | PackedEntry::SELECTED, true);

        e.clear(TermMask::single(2), PackedEntry::MATCHED);

        assert!(!e.term(2));
        assert!(e.term(3));
        assert!(!e.is_matched());
        assert!(e.is_selected());
        assert!(e.is_continuation());
        assert_eq!(e.offset(), 10);
    }

    #[test]
    fn test_term_mask_subset() {
        let a = TermMask(0b0110);
        let b = TermMask(0b1110);
        assert!(a.is_subset_of(b));
        assert!(!b.is_subset_of(a));
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
