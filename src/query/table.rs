//! Term table: live search terms and their result bits.
//!
//! At most [`TERM_CAPACITY`] terms are live at once, one per term bit of the
//! packed entries. When a new term is needed and every bit is taken, the least
//! recently used term is evicted and its bit handed to the newcomer.

use crate::index::{TermMask, TERM_BITS};
use crate::query::term::{Matcher, SearchTerm, TermKey};
use ahash::RandomState;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

pub const TERM_CAPACITY: usize = TERM_BITS as usize;

pub struct TermTable {
    terms: LruCache<TermKey, SearchTerm, RandomState>,
    /// Key owning each bit
    owners: [Option<TermKey>; TERM_CAPACITY],
}

impl Default for TermTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TermTable {
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(TERM_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            terms: LruCache::with_hasher(capacity, RandomState::new()),
            owners: Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Look up a live term without touching its recency
    pub fn peek(&self, key: &TermKey) -> Option<&SearchTerm> {
        self.terms.peek(key)
    }

    /// Term currently holding `bit`
    pub fn term(&self, bit: u8) -> Option<&SearchTerm> {
        let key = self.owners.get(bit as usize)?.as_ref()?;
        self.terms.peek(key)
    }

    /// Bit of an existing term (promoted to most recently used) or of a newly
    /// admitted one, evicting the least recently used term when full.
    pub fn acquire(&mut self, key: TermKey, field: Option<String>, matcher: Arc<Matcher>) -> u8 {
        if let Some(term) = self.terms.get(&key) {
            return term.bit;
        }

        let bit = match self.free_bit() {
            Some(bit) => bit,
            None => self.evict_lru(),
        };

        debug!(term = %key, bit, "term admitted");
        self.owners[bit as usize] = Some(key.clone());
        self.terms.put(
            key.clone(),
            SearchTerm {
                key,
                field,
                bit,
                computed: false,
                matcher,
            },
        );
        bit
    }

    fn free_bit(&self) -> Option<u8> {
        self.owners.iter().position(Option::is_none).map(|i| i as u8)
    }

    fn evict_lru(&mut self) -> u8 {
        match self.terms.pop_lru() {
            Some((key, term)) => {
                debug!(term = %key, bit = term.bit, "term evicted");
                self.owners[term.bit as usize] = None;
                term.bit
            }
            None => 0,
        }
    }

    /// Bits in `mask` whose terms have no complete results yet
    pub fn pending(&self, mask: TermMask) -> TermMask {
        let mut pending = TermMask::EMPTY;
        for bit in mask.iter() {
            if !self.term(bit).is_some_and(|t| t.computed) {
                pending.insert(bit);
            }
        }
        pending
    }

    /// Bits of all computed terms
    pub fn computed(&self) -> TermMask {
        let mut mask = TermMask::EMPTY;
        for (_, term) in self.terms.iter() {
            if term.computed {
                mask.insert(term.bit);
            }
        }
        mask
    }

    pub fn mark_computed(&mut self, mask: TermMask) {
        for bit in mask.iter() {
            if let Some(key) = self.owners[bit as usize].clone()
                && let Some(term) = self.terms.peek_mut(&key)
            {
                term.computed = true;
            }
        }
    }

    /// Forget all results, keeping the terms
    pub fn invalidate(&mut self) {
        for (_, term) in self.terms.iter_mut() {
            term.computed = false;
        }
    }

    /// Matchers for the terms in `mask`
    pub fn matchers(&self, mask: TermMask) -> Vec<(u8, Arc<Matcher>)> {
        mask.iter()
            .filter_map(|bit| self.term(bit).map(|t| (bit, t.matcher.clone())))
            .collect()
    }

    /// Live terms, most recently used first
    pub fn iter(&self) -> impl Iterator<Item = &SearchTerm> {
        self.terms.iter().map(|(_, term)| term)
    }
}
