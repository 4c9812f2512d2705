//! Export of raw line bytes.
//!
//! Exported bytes are copied from storage as they were loaded, terminators
//! included, independent of the text encoding.

use crate::cancel::CancelToken;
use crate::context::{TextLayout, ThreadContext};
use crate::events::{Observer, OperationResult};
use crate::index::LineIndex;
use crate::storage::Storage;
use anyhow::{bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::ops::Range;
use std::time::Instant;
use tracing::info;

/// Bytes copied per storage read when exporting everything
const COPY_BLOCK: u64 = 1024 * 1024;

/// Units processed between progress reports and cancellation checks
const REPORT_INTERVAL: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSelection {
    /// The whole content
    All,
    /// Logical lines, in the given order
    Lines(Vec<usize>),
    /// Partial lines, in the given order
    Partials(Vec<usize>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Wrap the output in gzip
    pub gzip: bool,
}

/// Write the selected bytes to `out`
#[allow(clippy::too_many_arguments)]
pub fn export(
    storage: &Storage,
    index: &LineIndex,
    layout: TextLayout,
    selection: &ExportSelection,
    out: &mut dyn Write,
    options: ExportOptions,
    observer: &dyn Observer,
    cancel: &CancelToken,
) -> OperationResult {
    let start = Instant::now();
    storage.drain();

    let outcome = if options.gzip {
        let mut encoder = GzEncoder::new(out, Compression::default());
        copy(storage, index, layout, selection, &mut encoder, observer, cancel).and_then(|done| {
            encoder.try_finish().context("Failed to finish gzip stream")?;
            Ok(done)
        })
    } else {
        copy(storage, index, layout, selection, out, observer, cancel).and_then(|done| {
            out.flush()?;
            Ok(done)
        })
    };

    let elapsed = start.elapsed();
    let result = match outcome {
        Ok(true) => OperationResult::completed(elapsed),
        Ok(false) => OperationResult::cancelled(elapsed),
        Err(e) => OperationResult::failed(elapsed, e),
    };
    info!(
        cancelled = result.cancelled,
        failed = result.error.is_some(),
        elapsed_ms = elapsed.as_millis() as u64,
        "export finished"
    );
    observer.on_export_complete(&result);
    result
}

fn copy(
    storage: &Storage,
    index: &LineIndex,
    layout: TextLayout,
    selection: &ExportSelection,
    out: &mut dyn Write,
    observer: &dyn Observer,
    cancel: &CancelToken,
) -> Result<bool> {
    let mut ctx = ThreadContext::new(storage, layout);
    let mut reader = storage.reader();
    let mut block = Vec::new();

    let ranges: Box<dyn Iterator<Item = Result<Range<u64>>>> = match selection {
        ExportSelection::All => {
            let (start, end) = (index.start_offset(), index.end_offset());
            Box::new(
                (start..end)
                    .step_by(COPY_BLOCK as usize)
                    .map(move |from| Ok(from..(from + COPY_BLOCK).min(end))),
            )
        }
        ExportSelection::Lines(lines) => Box::new(lines.iter().map(|&line| {
            if line >= index.line_count() {
                bail!("line {} out of range (0..{})", line, index.line_count());
            }
            Ok(index.line_range(line))
        })),
        ExportSelection::Partials(partials) => Box::new(partials.iter().map(|&partial| {
            if partial >= index.partial_count() {
                bail!("partial line {} out of range (0..{})", partial, index.partial_count());
            }
            Ok(index.partial_range(partial))
        })),
    };

    let total = match selection {
        ExportSelection::All => (index.end_offset() - index.start_offset()).div_ceil(COPY_BLOCK) as usize,
        ExportSelection::Lines(v) | ExportSelection::Partials(v) => v.len(),
    };
    let whole = matches!(selection, ExportSelection::All);

    for (i, range) in ranges.enumerate() {
        if i > 0 && i % REPORT_INTERVAL == 0 {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            observer.on_progress((i * 100 / total.max(1)) as u8);
        }

        let range = range?;
        let bytes = if whole {
            // Block boundaries are arbitrary; no code unit alignment
            block.clear();
            reader.read_into(range.start, (range.end - range.start) as usize, &mut block)?;
            &block[..]
        } else {
            ctx.raw_bytes(range)?
        };
        out.write_all(bytes).context("Failed to write export")?;
    }

    observer.on_progress(100);
    Ok(true)
}
