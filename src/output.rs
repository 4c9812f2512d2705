//! Terminal output for search results and document statistics

use crate::document::Document;
use crate::query::Matcher;
use crate::storage::StorageKind;
use std::io::{self, IsTerminal, Write};
use std::ops::Range;
use std::sync::Arc;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Stdout stream, colored only when asked for and attached to a terminal
pub fn stdout(color: bool) -> StandardStream {
    let choice = if color && io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print every matched partial line, grep style.
///
/// Continuations of a split line are marked with `+` instead of `:` after the
/// line number. Returns the number of lines printed.
pub fn print_matches<W: WriteColor>(
    out: &mut W,
    doc: &Document,
    line_numbers: bool,
    limit: Option<usize>,
) -> io::Result<usize> {
    let highlighters = doc.highlighters();
    let mut ctx = doc.display_context();
    let mut spans = Vec::new();
    let mut printed = 0;

    for partial in doc.matches() {
        if limit.is_some_and(|limit| printed >= limit) {
            break;
        }

        if line_numbers {
            let line = doc.index().line_of_partial(partial);
            let continuation = doc.index().entry(partial).is_continuation();
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            write!(out, "{}", line + 1)?;
            out.reset()?;
            write!(out, "{}", if continuation { '+' } else { ':' })?;
        }

        let line = ctx.partial_line(doc.index(), partial);
        if line.faulted {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
            writeln!(out, "{}", line.text)?;
            out.reset()?;
        } else {
            highlight_spans(&line.text, &highlighters, &mut spans);
            print_highlighted(out, &line.text, &spans)?;
            if line.truncated {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
                write!(out, " [...]")?;
                out.reset()?;
            }
            writeln!(out)?;
        }
        printed += 1;
    }

    Ok(printed)
}

/// Sorted, merged byte ranges of every matcher hit in `text`
fn highlight_spans(text: &str, matchers: &[Arc<Matcher>], spans: &mut Vec<Range<usize>>) {
    spans.clear();
    for matcher in matchers {
        matcher.find_spans(text, spans);
    }
    spans.sort_by_key(|r| r.start);

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    *spans = merged;
}

fn print_highlighted<W: WriteColor>(out: &mut W, text: &str, spans: &[Range<usize>]) -> io::Result<()> {
    let mut pos = 0;
    for span in spans {
        write!(out, "{}", &text[pos..span.start])?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(out, "{}", &text[span.clone()])?;
        out.reset()?;
        pos = span.end;
    }
    write!(out, "{}", &text[pos..])
}

/// Print load and storage statistics
pub fn print_stats<W: WriteColor>(out: &mut W, doc: &Document) -> io::Result<()> {
    let stats = doc.stats();
    let storage = doc.storage_stats();

    header(out, "Content")?;
    writeln!(out, "  Bytes:            {}", format_bytes(stats.bytes))?;
    writeln!(out, "  Encoding:         {}", doc.encoding())?;
    writeln!(out, "  Lines:            {}", doc.line_count())?;
    writeln!(out, "  Partial lines:    {}", doc.partial_count())?;
    writeln!(out, "  Forced splits:    {}", stats.forced_splits)?;

    header(out, "Storage")?;
    writeln!(out, "  Kind:             {:?}", doc.storage_kind())?;
    writeln!(out, "  Raw chunks:       {}", storage.raw_chunks)?;
    writeln!(out, "  Compressed:       {}", storage.compressed_chunks)?;
    writeln!(out, "  Resident:         {}", format_bytes(storage.resident_bytes()))?;
    if doc.storage_kind() == StorageKind::Compressed && !storage.compression_enabled {
        writeln!(out, "  Compression disabled (poor ratio)")?;
    }

    let longest = doc.longest_lines();
    if !longest.is_empty() {
        header(out, "Longest lines")?;
        for &(partial, len) in longest.iter().take(5) {
            let line = doc.index().line_of_partial(partial);
            writeln!(out, "  {:>10}  line {}", format_bytes(len), line + 1)?;
        }
    }
    Ok(())
}

fn header<W: WriteColor>(out: &mut W, title: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    writeln!(out, "{}", title)?;
    out.reset()
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::config::Config;
    use crate::events::NoopObserver;
    use crate::loader::ReadSource;
    use crate::query::{MatchKind, TermKey};
    use std::io::Cursor;
    use termcolor::NoColor;

    fn document(text: &str, max_partial: usize) -> Document {
        let mut source = ReadSource::new(Cursor::new(text.as_bytes().to_vec()), None);
        let config = Config {
            max_partial_size: max_partial,
            ..Config::default()
        };
        Document::load(&mut source, config, &NoopObserver, &CancelToken::new()).0
    }

    #[test]
    fn test_merged_spans() {
        let matchers = vec![
            Arc::new(Matcher::compile(&TermKey::new(MatchKind::Substring, "noot")).unwrap()),
            Arc::new(Matcher::compile(&TermKey::new(MatchKind::Substring, "ootm")).unwrap()),
        ];
        let mut spans = Vec::new();
        highlight_spans("aap nootmies noot", &matchers, &mut spans);
        assert_eq!(spans, vec![4..9, 13..17]);
    }

    #[test]
    fn test_print_matches_with_line_numbers() {
        let mut doc = document("aap\nnoot\naap noot\n", 1000);
        doc.search("noot", &NoopObserver, &CancelToken::new()).unwrap();

        let mut out = NoColor::new(Vec::new());
        let printed = print_matches(&mut out, &doc, true, None).unwrap();
        assert_eq!(printed, 2);
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "2:noot\n3:aap noot\n");
    }

    #[test]
    fn test_print_matches_marks_continuations() {
        let mut doc = document("0123456789abcdefghij\n", 8);
        doc.search("r:[0-9a-z]", &NoopObserver, &CancelToken::new()).unwrap();

        let mut out = NoColor::new(Vec::new());
        print_matches(&mut out, &doc, true, Some(2)).unwrap();
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "1:01234567\n1+89abcdef\n");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
