use crate::index::entry::{PackedEntry, TermMask};
use std::ops::Range;

/// Ordered packed entries, one per partial line, followed by a sentinel
/// entry whose offset marks the end of the content.
#[derive(Debug, Clone)]
pub struct LineIndex {
    entries: Vec<PackedEntry>,
    /// First partial index of every logical line; `None` when no line was split
    line_map: Option<Vec<usize>>,
}

impl LineIndex {
    /// Index over empty content starting at `base`
    pub fn empty(base: u64) -> Self {
        Self {
            entries: vec![PackedEntry::new(base, false)],
            line_map: None,
        }
    }

    pub(crate) fn from_parts(entries: Vec<PackedEntry>, line_map: Option<Vec<usize>>) -> Self {
        debug_assert!(!entries.is_empty(), "index needs a sentinel");
        debug_assert!(
            entries.windows(2).all(|w| w[0].offset() < w[1].offset()),
            "offsets must strictly increase"
        );
        Self { entries, line_map }
    }

    /// Number of searchable units (sentinel excluded)
    pub fn partial_count(&self) -> usize {
        self.entries.len() - 1
    }

    /// Number of logical lines
    pub fn line_count(&self) -> usize {
        match &self.line_map {
            Some(map) => map.len(),
            None => self.partial_count(),
        }
    }

    pub fn has_split_lines(&self) -> bool {
        self.line_map.is_some()
    }

    /// Offset of the first byte
    pub fn start_offset(&self) -> u64 {
        self.entries[0].offset()
    }

    /// Offset one past the last byte
    pub fn end_offset(&self) -> u64 {
        self.entries[self.entries.len() - 1].offset()
    }

    pub fn entry(&self, partial: usize) -> PackedEntry {
        self.entries[partial]
    }

    /// All entries including the sentinel
    pub fn entries(&self) -> &[PackedEntry] {
        &self.entries
    }

    /// Searchable entries (sentinel excluded), for flag updates
    pub fn partials_mut(&mut self) -> &mut [PackedEntry] {
        let n = self.partial_count();
        &mut self.entries[..n]
    }

    /// Byte range of a partial line, terminator included
    pub fn partial_range(&self, partial: usize) -> Range<u64> {
        self.entries[partial].offset()..self.entries[partial + 1].offset()
    }

    /// Partial-line indices making up a logical line
    pub fn partials_of_line(&self, line: usize) -> Range<usize> {
        match &self.line_map {
            Some(map) => {
                let first = map[line];
                let next = map.get(line + 1).copied().unwrap_or(self.partial_count());
                first..next
            }
            None => line..line + 1,
        }
    }

    /// Byte range of a logical line, terminator included
    pub fn line_range(&self, line: usize) -> Range<u64> {
        let partials = self.partials_of_line(line);
        self.entries[partials.start].offset()..self.entries[partials.end].offset()
    }

    /// Logical line containing a partial line
    pub fn line_of_partial(&self, partial: usize) -> usize {
        match &self.line_map {
            Some(map) => match map.binary_search(&partial) {
                Ok(line) => line,
                Err(next) => next - 1,
            },
            None => partial,
        }
    }

    /// Partial line containing a byte offset
    pub fn partial_at_offset(&self, offset: u64) -> Option<usize> {
        if offset < self.start_offset() || offset >= self.end_offset() {
            return None;
        }
        let i = self.entries.partition_point(|e| e.offset() <= offset);
        Some(i - 1)
    }

    /// Indices of entries flagged MATCHED by the last search
    pub fn matches(&self) -> impl Iterator<Item = usize> + '_ {
        self.flagged(PackedEntry::MATCHED)
    }

    pub fn match_count(&self) -> usize {
        self.matches().count()
    }

    /// Indices of entries flagged SELECTED
    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.flagged(PackedEntry::SELECTED)
    }

    fn flagged(&self, flag: u64) -> impl Iterator<Item = usize> + '_ {
        self.entries[..self.partial_count()]
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.has(flag))
            .map(|(i, _)| i)
    }

    /// Set or clear SELECTED on a range of partial lines
    pub fn select(&mut self, partials: Range<usize>, on: bool) {
        let n = self.partial_count();
        let range = partials.start.min(n)..partials.end.min(n);
        for entry in &mut self.entries[range] {
            entry.set(PackedEntry::SELECTED, on);
        }
    }

    pub fn clear_selection(&mut self) {
        self.select(0..self.partial_count(), false);
    }

    /// Clear term bits and status flags on every entry
    pub fn clear_flags(&mut self, terms: TermMask, status: u64) {
        for entry in self.partials_mut() {
            entry.clear(terms, status);
        }
    }
}
