use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Default number of longest partial lines remembered
pub const LONGEST_CAPACITY: usize = 32;

/// Bounded record of the longest partial lines seen while building.
///
/// Kept as a min-heap so the shortest tracked line is evicted first. Decode
/// buffers are sized from it without a second pass over the index.
#[derive(Debug, Clone)]
pub struct LongestLines {
    capacity: usize,
    heap: BinaryHeap<Reverse<(u64, usize)>>,
}

impl LongestLines {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            heap: BinaryHeap::with_capacity(capacity + 1),
        }
    }

    /// Record a partial line of `len` bytes at `index`
    pub fn record(&mut self, index: usize, len: u64) {
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse((len, index)));
        } else if let Some(Reverse((min_len, _))) = self.heap.peek() {
            if len > *min_len {
                self.heap.pop();
                self.heap.push(Reverse((len, index)));
            }
        }
    }

    /// Length in bytes of the longest partial line seen
    pub fn max_len(&self) -> u64 {
        self.heap.iter().map(|Reverse((len, _))| *len).max().unwrap_or(0)
    }

    /// Tracked `(index, len)` pairs, longest first
    pub fn sorted(&self) -> Vec<(usize, u64)> {
        let mut out: Vec<(usize, u64)> = self
            .heap
            .iter()
            .map(|Reverse((len, index))| (*index, *len))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for LongestLines {
    fn default() -> Self {
        Self::new(LONGEST_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_longest() {
        let mut longest = LongestLines::new(3);
        for (i, len) in [5u64, 1, 9, 3, 7, 2].into_iter().enumerate() {
            longest.record(i, len);
        }
        assert_eq!(longest.len(), 3);
        assert_eq!(longest.max_len(), 9);
        assert_eq!(longest.sorted(), vec![(2, 9), (4, 7), (0, 5)]);
    }

    #[test]
    fn test_empty() {
        let longest = LongestLines::default();
        assert!(longest.is_empty());
        assert_eq!(longest.max_len(), 0);
    }
}
