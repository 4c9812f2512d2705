use crate::index::entry::{PackedEntry, MAX_OFFSET};
use crate::index::line_index::LineIndex;
use crate::index::longest::LongestLines;
use crate::utils::{detect_encoding, DetectedEncoding, TextEncoding};
use anyhow::{bail, Result};
use tracing::debug;

/// Default look-back window for choosing a split point
pub const DEFAULT_SPLIT_LOOKBACK: usize = 32;

/// Separators preferred for forced splits; they rarely sit inside a token
const HARD_SEPARATORS: [u8; 2] = [b'>', b':'];
/// Fallback separators; demoted so numbers and JSON keys survive when possible
const SOFT_SEPARATORS: [u8; 4] = [b' ', b'\t', b'.', b','];

/// Builder statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub bytes: u64,
    pub lines: usize,
    pub partial_lines: usize,
    pub forced_splits: usize,
}

/// Streaming line index builder.
///
/// Feed byte blocks in order with [`push`](Self::push), then call
/// [`finish`](Self::finish). Lines longer than `max_partial_size` bytes (not
/// counting the `\n` or `\r\n` terminator) are cut into CONTINUATION partial
/// lines.
pub struct LineIndexBuilder {
    max_partial_size: u64,
    lookback: usize,
    entries: Vec<PackedEntry>,
    /// Logical lines started so far
    lines: usize,
    /// First partial of every line; only kept once a line has been split
    line_starts: Vec<usize>,
    forced_splits: usize,
    /// Absolute offset of the next byte to be pushed
    position: u64,
    /// Last bytes of the previous blocks, for look-back across block boundaries
    carry: Vec<u8>,
    longest: LongestLines,
    /// Encoding used instead of detection
    forced_encoding: Option<TextEncoding>,
    /// Settled on the first non-empty block
    encoding: Option<DetectedEncoding>,
}

impl LineIndexBuilder {
    pub fn new(max_partial_size: usize, lookback: usize) -> Self {
        Self::with_base(0, max_partial_size, lookback)
    }

    /// Builder for content whose first byte sits at absolute offset `base`
    pub fn with_base(base: u64, max_partial_size: usize, lookback: usize) -> Self {
        let max_partial_size = max_partial_size.max(1) as u64;
        Self {
            max_partial_size,
            lookback: lookback.min(max_partial_size as usize - 1),
            entries: vec![PackedEntry::new(base, false)],
            lines: 1,
            line_starts: Vec::new(),
            forced_splits: 0,
            position: base,
            carry: Vec::with_capacity(lookback + 1),
            longest: LongestLines::default(),
            forced_encoding: None,
            encoding: None,
        }
    }

    /// Skip detection and use `encoding`; a matching BOM is still recognised
    pub fn with_encoding(mut self, encoding: Option<TextEncoding>) -> Self {
        self.forced_encoding = encoding;
        self
    }

    /// Encoding of the content, detected from the first block.
    ///
    /// Before any content arrives this is the override, or UTF-8.
    pub fn encoding(&self) -> DetectedEncoding {
        self.encoding.unwrap_or(DetectedEncoding {
            encoding: self.forced_encoding.unwrap_or_default(),
            bom_len: 0,
        })
    }

    fn settle_encoding(&mut self, first_block: &[u8]) {
        let detected = match self.forced_encoding {
            Some(encoding) => DetectedEncoding {
                encoding,
                bom_len: if first_block.starts_with(encoding.bom()) {
                    encoding.bom().len()
                } else {
                    0
                },
            },
            None => detect_encoding(first_block),
        };
        debug!(encoding = %detected.encoding, bom = detected.bom_len, "encoding settled");
        self.encoding = Some(detected);
    }

    /// Consume the next block of content
    pub fn push(&mut self, block: &[u8]) -> Result<()> {
        let block_start = self.position;
        let block_end = block_start + block.len() as u64;
        if block_end > MAX_OFFSET {
            bail!("content exceeds the addressable size of {} bytes", MAX_OFFSET);
        }
        if self.encoding.is_none() && !block.is_empty() {
            self.settle_encoding(block);
        }

        let mut pos = block_start;
        while pos < block_end {
            let partial_start = self.current_start();
            // Byte offset at which a non-terminator forces a split; a `\r\n`
            // may start there
            let limit = partial_start + self.max_partial_size;
            let scan_end = block_end.min(limit + 2);

            let rel = (pos - block_start) as usize..(scan_end - block_start) as usize;
            if let Some(hit) = memchr::memchr(b'\n', &block[rel]) {
                let newline = pos + hit as u64;
                if newline <= limit || self.byte_at(block, block_start, limit) == b'\r' {
                    self.start_partial(newline + 1, false);
                    pos = newline + 1;
                    continue;
                }
            }

            // A CR at the limit that ends the block waits for the next one
            let must_split = limit + 1 < block_end
                || (limit < block_end && self.byte_at(block, block_start, limit) != b'\r');
            if must_split {
                let split = self.choose_split(block, block_start, partial_start, limit);
                if self.forced_splits == 0 {
                    // Until the first split every partial starts a line
                    self.line_starts = (0..self.entries.len()).collect();
                }
                self.start_partial(split, true);
                self.forced_splits += 1;
                // Bytes before `pos` were already scanned, possibly in an
                // earlier block
                pos = split.max(pos);
            } else {
                pos = block_end;
            }
        }

        self.position = block_end;
        self.update_carry(block);
        Ok(())
    }

    fn current_start(&self) -> u64 {
        self.entries[self.entries.len() - 1].offset()
    }

    fn start_partial(&mut self, offset: u64, continuation: bool) {
        let previous = self.entries.len() - 1;
        self.longest
            .record(previous, offset - self.entries[previous].offset());
        if !continuation {
            self.lines += 1;
            if self.forced_splits > 0 {
                self.line_starts.push(self.entries.len());
            }
        }
        self.entries.push(PackedEntry::new(offset, continuation));
    }

    /// Pick the split offset for a partial line that reached `limit`.
    ///
    /// Looks at the `lookback` bytes before `limit` for the right-most hard
    /// separator, then the right-most soft one, and splits just after it.
    /// Without either the split falls exactly on the limit.
    fn choose_split(&self, block: &[u8], block_start: u64, partial_start: u64, limit: u64) -> u64 {
        let window_start = limit.saturating_sub(self.lookback as u64).max(partial_start + 1);
        let mut soft: Option<u64> = None;

        let mut p = limit;
        while p > window_start {
            p -= 1;
            let byte = self.byte_at(block, block_start, p);
            if HARD_SEPARATORS.contains(&byte) {
                return p + 1;
            }
            if soft.is_none() && SOFT_SEPARATORS.contains(&byte) {
                soft = Some(p + 1);
            }
        }

        soft.unwrap_or(limit)
    }

    fn byte_at(&self, block: &[u8], block_start: u64, offset: u64) -> u8 {
        if offset >= block_start {
            block[(offset - block_start) as usize]
        } else {
            let back = (block_start - offset) as usize;
            // Offsets before the block are within the look-back window
            self.carry
                .get(self.carry.len().wrapping_sub(back))
                .copied()
                .unwrap_or(0)
        }
    }

    /// Keep the look-back window plus the byte at a limit that ended the block
    fn update_carry(&mut self, block: &[u8]) {
        let keep = self.lookback + 1;
        if block.len() >= keep {
            self.carry.clear();
            self.carry.extend_from_slice(&block[block.len() - keep..]);
        } else {
            self.carry.extend_from_slice(block);
            let excess = self.carry.len().saturating_sub(keep);
            self.carry.drain(..excess);
        }
    }

    /// Bytes consumed so far, base offset included
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn stats(&self) -> BuildStats {
        let open_partial = usize::from(self.current_start() < self.position);
        let closed = self.entries.len() - 1;
        BuildStats {
            bytes: self.position - self.entries[0].offset(),
            lines: self.lines - usize::from(open_partial == 0),
            partial_lines: closed + open_partial,
            forced_splits: self.forced_splits,
        }
    }

    pub fn longest(&self) -> &LongestLines {
        &self.longest
    }

    /// Point-in-time index over everything pushed so far.
    ///
    /// The trailing unterminated line, if any, is closed by a provisional
    /// sentinel at the current position.
    pub fn snapshot(&self) -> LineIndex {
        let mut entries = self.entries.clone();
        let mut line_starts = self.line_starts.clone();
        seal(&mut entries, &mut line_starts, self.position);
        let line_map = (self.forced_splits > 0).then_some(line_starts);
        LineIndex::from_parts(entries, line_map)
    }

    /// Finish the stream and return the complete index
    pub fn finish(mut self) -> (LineIndex, LongestLines) {
        if self.current_start() < self.position {
            let last = self.entries.len() - 1;
            self.longest
                .record(last, self.position - self.entries[last].offset());
        }
        let lines = self.stats().lines;

        let mut entries = std::mem::take(&mut self.entries);
        let mut line_starts = std::mem::take(&mut self.line_starts);
        seal(&mut entries, &mut line_starts, self.position);

        debug!(
            bytes = self.position - entries[0].offset(),
            partials = entries.len() - 1,
            lines,
            splits = self.forced_splits,
            "line index complete"
        );

        let line_map = (self.forced_splits > 0).then_some(line_starts);
        (LineIndex::from_parts(entries, line_map), self.longest)
    }
}

/// Close the trailing partial line with a sentinel at `end`
fn seal(entries: &mut Vec<PackedEntry>, line_starts: &mut Vec<usize>, end: u64) {
    let last = entries.len() - 1;
    if entries[last].offset() == end {
        // The last boundary sits at the end: it becomes the sentinel
        if line_starts.last() == Some(&last) {
            line_starts.pop();
        }
        entries[last] = PackedEntry::new(end, false);
    } else {
        entries.push(PackedEntry::new(end, false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(blocks: &[&[u8]], max: usize) -> LineIndex {
        let mut builder = LineIndexBuilder::new(max, DEFAULT_SPLIT_LOOKBACK);
        for block in blocks {
            builder.push(block).unwrap();
        }
        builder.finish().0
    }

    fn offsets(index: &LineIndex) -> Vec<u64> {
        index.entries().iter().map(|e| e.offset()).collect()
    }

    #[test]
    fn test_encoding_from_first_block() {
        let mut builder = LineIndexBuilder::new(1000, DEFAULT_SPLIT_LOOKBACK);
        assert_eq!(builder.encoding().encoding, TextEncoding::Utf8);
        builder.push(&[0xFF, 0xFE, b'a', 0, b'\n', 0]).unwrap();
        builder.push(b"ignored for detection").unwrap();
        assert_eq!(
            builder.encoding(),
            DetectedEncoding {
                encoding: TextEncoding::Utf16Le,
                bom_len: 2
            }
        );
    }

    #[test]
    fn test_encoding_override_keeps_bom() {
        let mut builder =
            LineIndexBuilder::new(1000, DEFAULT_SPLIT_LOOKBACK).with_encoding(Some(TextEncoding::Utf8));
        builder.push(b"\xEF\xBB\xBFplain\n").unwrap();
        assert_eq!(builder.encoding().bom_len, 3);

        let mut builder =
            LineIndexBuilder::new(1000, DEFAULT_SPLIT_LOOKBACK).with_encoding(Some(TextEncoding::Latin1));
        builder.push(b"caf\xE9\n").unwrap();
        assert_eq!(builder.encoding().encoding, TextEncoding::Latin1);
        assert_eq!(builder.encoding().bom_len, 0);
    }

    #[test]
    fn test_simple_lines() {
        let index = build(&[b"aap\nnoot noot\nmies mies mies\n"], 1000);
        assert_eq!(index.partial_count(), 3);
        assert_eq!(index.line_count(), 3);
        assert_eq!(offsets(&index), vec![0, 4, 14, 29]);
        assert!(!index.has_split_lines());
        assert!(index.entries().iter().all(|e| !e.is_continuation()));
    }

    #[test]
    fn test_unterminated_last_line() {
        let index = build(&[b"one\ntwo"], 1000);
        assert_eq!(index.partial_count(), 2);
        assert_eq!(offsets(&index), vec![0, 4, 7]);
    }

    #[test]
    fn test_empty_input() {
        let index = build(&[], 1000);
        assert_eq!(index.partial_count(), 0);
        assert_eq!(offsets(&index), vec![0]);

        let index = build(&[b""], 1000);
        assert_eq!(index.partial_count(), 0);
    }

    #[test]
    fn test_terminator_across_blocks() {
        let index = build(&[b"abc\r", b"\ndef\n", b"gh"], 1000);
        assert_eq!(offsets(&index), vec![0, 5, 9, 11]);
    }

    #[test]
    fn test_forced_split_exactly_at_limit() {
        let line = vec![b'x'; 10_000];
        let index = build(&[&line], 1000);
        assert_eq!(index.partial_count(), 10);
        assert_eq!(index.line_count(), 1);
        for i in 0..10 {
            assert_eq!(index.partial_range(i), (i as u64 * 1000)..(i as u64 + 1) * 1000);
            assert_eq!(index.entry(i).is_continuation(), i > 0);
        }
    }

    #[test]
    fn test_forced_split_with_trailing_newline() {
        let mut line = vec![b'x'; 10_000];
        line.push(b'\n');
        let index = build(&[&line], 1000);
        assert_eq!(index.partial_count(), 10);
        assert_eq!(index.partial_range(9), 9000..10_001);
    }

    #[test]
    fn test_split_prefers_hard_separator() {
        // soft separators right before the limit, a hard one further back
        let mut line = vec![b'a'; 100];
        line[80] = b':';
        line[95] = b' ';
        line[97] = b',';
        let index = build(&[&line], 100 - 1);
        assert_eq!(index.partial_range(0), 0..81);
        assert!(index.entry(1).is_continuation());
    }

    #[test]
    fn test_split_falls_back_to_soft_separator() {
        let mut line = vec![b'a'; 100];
        line[90] = b' ';
        line[95] = b'.';
        let index = build(&[&line], 99);
        assert_eq!(index.partial_range(0), 0..96);
    }

    #[test]
    fn test_split_ignores_separator_outside_lookback() {
        let mut line = vec![b'a'; 200];
        line[10] = b':';
        let index = build(&[&line], 100);
        assert_eq!(index.partial_range(0), 0..100);
    }

    #[test]
    fn test_split_lookback_spans_blocks() {
        let mut line = vec![b'a'; 150];
        line[95] = b'>';
        let (first, second) = line.split_at(98);
        let index = build(&[first, second], 100);
        assert_eq!(index.partial_range(0), 0..96);
    }

    #[test]
    fn test_split_point_in_previous_block() {
        // Still-open line whose separator sits in an earlier block
        let mut line = vec![b'a'; 300];
        line[95] = b'>';
        line[190] = b' ';
        let blocks: Vec<&[u8]> = line.chunks(7).collect();
        let index = build(&blocks, 100);
        assert_eq!(index.partial_range(0), 0..96);
        assert_eq!(index.partial_range(1), 96..191);
        assert_eq!(index.partial_range(2), 191..291);
        assert_eq!(index.partial_range(3), 291..300);
        assert_eq!(index.line_count(), 1);
    }

    #[test]
    fn test_crlf_line_at_limit_is_not_split() {
        let index = build(&[b"0123456789\r\nabc\r\n"], 10);
        assert_eq!(index.partial_count(), 2);
        assert!(!index.has_split_lines());
        assert_eq!(offsets(&index), vec![0, 12, 17]);

        // CR and LF arriving in separate blocks
        let index = build(&[b"0123456789\r", b"\nabc\r\n"], 10);
        assert_eq!(offsets(&index), vec![0, 12, 17]);
        assert!(index.entries().iter().all(|e| !e.is_continuation()));
    }

    #[test]
    fn test_cr_at_limit_without_newline_splits() {
        let index = build(&[b"0123456789\r", b"x\n"], 10);
        assert_eq!(offsets(&index), vec![0, 10, 13]);
        assert!(index.entry(1).is_continuation());
    }

    #[test]
    fn test_line_map_built_on_first_split() {
        let mut builder = LineIndexBuilder::new(4, 0);
        builder.push(b"ab\ncd\n").unwrap();
        assert!(!builder.snapshot().has_split_lines());
        builder.push(b"efghij\nk\n").unwrap();
        let (index, _) = builder.finish();
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.partial_count(), 5);
        assert_eq!(index.partials_of_line(2), 2..4);
        assert_eq!(index.line_of_partial(4), 3);
    }

    #[test]
    fn test_split_lines_build_line_map() {
        let mut content = b"short\n".to_vec();
        content.extend(vec![b'y'; 25]);
        content.extend_from_slice(b"\nend\n");
        let index = build(&[&content], 10);

        assert!(index.has_split_lines());
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.partial_count(), 5);
        assert_eq!(index.partials_of_line(1), 1..4);
        assert_eq!(index.line_of_partial(4), 2);
        assert_eq!(index.line_range(1), 6..32);
    }

    #[test]
    fn test_newline_exactly_at_limit_is_not_split() {
        let mut content = vec![b'z'; 10];
        content.push(b'\n');
        let index = build(&[&content], 10);
        assert_eq!(index.partial_count(), 1);
        assert!(!index.has_split_lines());
    }

    #[test]
    fn test_snapshot_mid_stream() {
        let mut builder = LineIndexBuilder::new(1000, DEFAULT_SPLIT_LOOKBACK);
        builder.push(b"one\ntw").unwrap();
        let snap = builder.snapshot();
        assert_eq!(snap.partial_count(), 2);
        assert_eq!(snap.end_offset(), 6);

        builder.push(b"o\nthree\n").unwrap();
        let (index, _) = builder.finish();
        assert_eq!(index.partial_count(), 3);
        // the snapshot is unaffected by later pushes
        assert_eq!(snap.partial_count(), 2);
    }

    #[test]
    fn test_longest_lines_tracked() {
        let mut builder = LineIndexBuilder::new(1000, DEFAULT_SPLIT_LOOKBACK);
        builder.push(b"a\nbbbbbbbbbb\nccc").unwrap();
        let (_, longest) = builder.finish();
        assert_eq!(longest.max_len(), 11);
        assert_eq!(longest.sorted()[0], (1, 11));
    }

    #[test]
    fn test_stats() {
        let mut builder = LineIndexBuilder::new(4, 2);
        builder.push(b"abcdefgh\nxy").unwrap();
        let stats = builder.stats();
        assert_eq!(stats.bytes, 11);
        assert_eq!(stats.forced_splits, 1);
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.partial_lines, 3);
    }
}
