//! Text encoding detection and decoding.
//!
//! Only the encodings a line index can be built for are supported: UTF-8,
//! UTF-16 (both byte orders) and Latin-1. Every other byte stream decodes as
//! Latin-1, which never fails.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of leading bytes inspected by [`detect_encoding`]
pub const DETECTION_WINDOW: usize = 64 * 1024;

/// Supported text encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl TextEncoding {
    /// Width of one code unit in bytes
    pub fn unit_width(self) -> usize {
        match self {
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => 2,
            TextEncoding::Utf8 | TextEncoding::Latin1 => 1,
        }
    }

    /// Byte order mark for this encoding, if it has one
    pub fn bom(self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            TextEncoding::Utf16Le => &[0xFF, 0xFE],
            TextEncoding::Utf16Be => &[0xFE, 0xFF],
            TextEncoding::Latin1 => &[],
        }
    }

    /// Align a `[start, end)` byte window to code unit boundaries.
    ///
    /// The builder only looks for the `0x0A` byte. In UTF-16LE the terminator's
    /// low byte comes first, so boundaries land one byte early and are rounded
    /// up; in UTF-16BE they land on the next unit already and odd forced splits
    /// are rounded down. Both ends are moved the same way so adjacent windows
    /// stay contiguous.
    pub fn align_window(self, start: u64, end: u64, content_end: u64) -> (u64, u64) {
        match self {
            TextEncoding::Utf16Le => {
                let up = |v: u64| (v + (v & 1)).min(content_end);
                let (s, e) = (up(start), up(end));
                (s, e.max(s))
            }
            TextEncoding::Utf16Be => {
                let (s, e) = (start & !1, end & !1);
                (s, e.max(s))
            }
            TextEncoding::Utf8 | TextEncoding::Latin1 => (start, end),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Latin1 => "latin-1",
        };
        f.write_str(name)
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-16le" | "utf16le" | "utf-16" => Ok(TextEncoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(TextEncoding::Utf16Be),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(format!("unsupported encoding '{}'", other)),
        }
    }
}

/// Outcome of encoding detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedEncoding {
    pub encoding: TextEncoding,
    /// Length of the byte order mark at the start of the content (0 if none)
    pub bom_len: usize,
}

/// Detect the encoding of a text stream from its first block.
///
/// A byte order mark wins. Without one, zero bytes concentrated on one parity
/// signal UTF-16; valid multi-byte UTF-8 sequences with few invalid high bytes
/// signal UTF-8. Anything else is Latin-1. Pure ASCII reports UTF-8.
pub fn detect_encoding(first_block: &[u8]) -> DetectedEncoding {
    for encoding in [TextEncoding::Utf8, TextEncoding::Utf16Le, TextEncoding::Utf16Be] {
        let bom = encoding.bom();
        if first_block.starts_with(bom) {
            return DetectedEncoding {
                encoding,
                bom_len: bom.len(),
            };
        }
    }

    let sample = &first_block[..first_block.len().min(DETECTION_WINDOW)];
    let encoding = classify(sample);
    DetectedEncoding {
        encoding,
        bom_len: 0,
    }
}

fn classify(sample: &[u8]) -> TextEncoding {
    if sample.is_empty() {
        return TextEncoding::Utf8;
    }

    let mut zeros_even = 0usize;
    let mut zeros_odd = 0usize;
    for (i, &b) in sample.iter().enumerate() {
        if b == 0 {
            if i & 1 == 0 {
                zeros_even += 1;
            } else {
                zeros_odd += 1;
            }
        }
    }

    let pairs = sample.len() / 2;
    if pairs > 0 {
        // Latin text in UTF-16 has a zero in almost every unit
        let threshold = (pairs / 4).max(1);
        if zeros_odd >= threshold && zeros_odd > zeros_even * 4 {
            return TextEncoding::Utf16Le;
        }
        if zeros_even >= threshold && zeros_even > zeros_odd * 4 {
            return TextEncoding::Utf16Be;
        }
    }

    let (valid_multibyte, invalid_high) = utf8_sequence_stats(sample);
    if invalid_high == 0 || valid_multibyte > invalid_high * 8 {
        TextEncoding::Utf8
    } else {
        TextEncoding::Latin1
    }
}

/// Count well-formed multi-byte UTF-8 sequences and stray high bytes.
/// A sequence cut off by the end of the sample is not counted either way.
fn utf8_sequence_stats(sample: &[u8]) -> (usize, usize) {
    let mut valid = 0usize;
    let mut invalid = 0usize;
    let mut i = 0usize;

    while i < sample.len() {
        let b = sample[i];
        let len = match b {
            0x00..=0x7F => {
                i += 1;
                continue;
            }
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => {
                invalid += 1;
                i += 1;
                continue;
            }
        };

        if i + len > sample.len() {
            break;
        }
        if sample[i + 1..i + len].iter().all(|&c| is_continuation(c)) {
            valid += 1;
            i += len;
        } else {
            invalid += 1;
            i += 1;
        }
    }

    (valid, invalid)
}

#[inline]
fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Decode `bytes` in the given encoding, appending to `out`
pub fn decode_into(encoding: TextEncoding, bytes: &[u8], out: &mut String) {
    match encoding {
        TextEncoding::Utf8 => decode_utf8_into(bytes, out),
        TextEncoding::Utf16Le => decode_utf16_into(bytes, out, u16::from_le_bytes),
        TextEncoding::Utf16Be => decode_utf16_into(bytes, out, u16::from_be_bytes),
        TextEncoding::Latin1 => out.extend(bytes.iter().map(|&b| b as char)),
    }
}

/// Lossy UTF-8 decoding.
///
/// An invalid sequence becomes a single U+FFFD and decoding resumes at the
/// next lead byte, skipping any orphaned continuation bytes.
fn decode_utf8_into(bytes: &[u8], out: &mut String) {
    let mut rest = bytes;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return;
            }
            Err(err) => {
                let good = err.valid_up_to();
                out.push_str(std::str::from_utf8(&rest[..good]).unwrap_or_default());
                out.push(char::REPLACEMENT_CHARACTER);

                let mut next = good + err.error_len().unwrap_or(rest.len() - good);
                while next < rest.len() && is_continuation(rest[next]) {
                    next += 1;
                }
                rest = &rest[next..];
            }
        }
    }
}

fn decode_utf16_into(bytes: &[u8], out: &mut String, unit: fn([u8; 2]) -> u16) {
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    out.extend(
        char::decode_utf16(units).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)),
    );
    if bytes.len() % 2 == 1 {
        out.push(char::REPLACEMENT_CHARACTER);
    }
}
