//! Per-thread access to decoded line text.
//!
//! A [`ThreadContext`] owns a storage reader plus scratch buffers, so every
//! consumer thread (search worker, display, export) needs its own. Reading
//! never fails hard: storage faults are logged and the line text is replaced
//! by a diagnostic.

use crate::index::LineIndex;
use crate::storage::{Storage, StorageError, StorageReader};
use crate::utils::{decode_into, TextEncoding};
use std::ops::Range;
use tracing::warn;

/// Where the text lives and how it is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLayout {
    pub encoding: TextEncoding,
    /// Byte order mark length at `start`
    pub bom_len: usize,
    /// Offset of the first content byte
    pub start: u64,
    /// Offset one past the last content byte
    pub end: u64,
}

impl TextLayout {
    pub fn new(encoding: TextEncoding, bom_len: usize, content: Range<u64>) -> Self {
        Self {
            encoding,
            bom_len,
            start: content.start,
            end: content.end,
        }
    }

    /// Byte window of `range` after BOM skipping and code unit alignment
    pub fn window(&self, range: Range<u64>) -> Range<u64> {
        let mut start = range.start;
        let bom_end = self.start + self.bom_len as u64;
        if start < bom_end {
            start = bom_end.min(range.end);
        }
        let (start, end) = self.encoding.align_window(start, range.end, self.end);
        start..end
    }
}

/// Display transformation applied after decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharFilter {
    #[default]
    None,
    /// Replace tabs by spaces up to the next multiple of the width
    ExpandTabs(usize),
    /// Replace C0 controls and DEL by their Unicode control pictures
    ControlPictures,
}

impl CharFilter {
    fn apply(self, text: &str, out: &mut String) {
        match self {
            CharFilter::None => out.push_str(text),
            CharFilter::ExpandTabs(width) => {
                let width = width.max(1);
                let mut column = 0usize;
                for c in text.chars() {
                    if c == '\t' {
                        let pad = width - column % width;
                        out.extend(std::iter::repeat_n(' ', pad));
                        column += pad;
                    } else {
                        out.push(c);
                        column += 1;
                    }
                }
            }
            CharFilter::ControlPictures => out.extend(text.chars().map(control_picture)),
        }
    }
}

fn control_picture(c: char) -> char {
    match c as u32 {
        code @ 0x00..=0x1F => char::from_u32(0x2400 + code).unwrap_or(c),
        0x7F => '\u{2421}',
        _ => c,
    }
}

/// Decoded text of one line or partial line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineText<'a> {
    pub text: &'a str,
    /// Text was cut at the character limit
    pub truncated: bool,
    /// Storage read failed; `text` holds a diagnostic
    pub faulted: bool,
}

pub struct ThreadContext {
    reader: StorageReader,
    layout: TextLayout,
    filter: CharFilter,
    max_chars: Option<usize>,
    bytes: Vec<u8>,
    text: String,
    display: String,
}

impl ThreadContext {
    pub fn new(storage: &Storage, layout: TextLayout) -> Self {
        Self {
            reader: storage.reader(),
            layout,
            filter: CharFilter::None,
            max_chars: None,
            bytes: Vec::new(),
            text: String::new(),
            display: String::new(),
        }
    }

    pub fn with_filter(mut self, filter: CharFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Pre-size scratch buffers for lines of up to `bytes` bytes
    pub fn reserve(&mut self, bytes: usize) {
        self.bytes.reserve(bytes);
        self.text.reserve(bytes);
    }

    pub fn layout(&self) -> TextLayout {
        self.layout
    }

    pub fn partial_line(&mut self, index: &LineIndex, partial: usize) -> LineText<'_> {
        self.text(index.partial_range(partial))
    }

    pub fn line(&mut self, index: &LineIndex, line: usize) -> LineText<'_> {
        self.text(index.line_range(line))
    }

    pub fn line_of_partial(&self, index: &LineIndex, partial: usize) -> usize {
        index.line_of_partial(partial)
    }

    /// Decoded text of a raw index byte range
    pub fn text(&mut self, range: Range<u64>) -> LineText<'_> {
        let window = self.layout.window(range);
        self.text.clear();

        let faulted = match self.read_window(window.clone()) {
            Ok(()) => {
                decode_into(self.layout.encoding, &self.bytes, &mut self.text);
                // One `\n` or `\r\n`; other CRs are content
                if self.text.ends_with('\n') {
                    self.text.pop();
                    if self.text.ends_with('\r') {
                        self.text.pop();
                    }
                }
                false
            }
            Err(e) => {
                warn!(start = window.start, end = window.end, error = %e, "line read failed");
                self.text = format!("<unreadable bytes {}..{}: {}>", window.start, window.end, e);
                true
            }
        };

        let mut truncated = false;
        if let Some(max) = self.max_chars
            && let Some((cut, _)) = self.text.char_indices().nth(max)
        {
            self.text.truncate(cut);
            truncated = true;
        }

        let text = if self.filter == CharFilter::None {
            self.text.as_str()
        } else {
            self.display.clear();
            self.filter.apply(&self.text, &mut self.display);
            self.display.as_str()
        };

        LineText {
            text,
            truncated,
            faulted,
        }
    }

    /// Stored bytes of a raw index byte range, aligned to code units
    pub fn raw_bytes(&mut self, range: Range<u64>) -> Result<&[u8], StorageError> {
        let (start, end) = self
            .layout
            .encoding
            .align_window(range.start, range.end, self.layout.end);
        self.read_window(start..end)?;
        Ok(&self.bytes)
    }

    fn read_window(&mut self, window: Range<u64>) -> Result<(), StorageError> {
        self.bytes.clear();
        let count = (window.end - window.start) as usize;
        self.reader.read_into(window.start, count, &mut self.bytes)
    }
}
