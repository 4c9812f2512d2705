//! Streaming load of a text into storage and a line index.
//!
//! The loader pulls blocks from a [`BlockSource`], appends them to the
//! storage and feeds them to the [`LineIndexBuilder`]. While the load runs it
//! reports progress and, at the configured cadence, hands out [`Snapshot`]s of
//! the index built so far.

pub mod source;

pub use source::{open_path, open_zip_member, BlockSource, MmapSource, ReadSource, BLOCK_SIZE};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::context::{TextLayout, ThreadContext};
use crate::events::{Observer, OperationResult};
use crate::index::{BuildStats, LineIndex, LineIndexBuilder, LongestLines};
use crate::storage::Storage;
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, info};

/// Point-in-time, read-only view of a load in progress.
///
/// The index is a copy; the storage is shared and only ever appended to, so
/// every range the snapshot's index refers to stays readable.
#[derive(Clone)]
pub struct Snapshot {
    pub index: LineIndex,
    pub storage: Storage,
    pub layout: TextLayout,
}

impl Snapshot {
    pub fn partial_count(&self) -> usize {
        self.index.partial_count()
    }

    pub fn context(&self) -> ThreadContext {
        ThreadContext::new(&self.storage, self.layout)
    }
}

/// Everything a finished (or aborted) load produced
pub struct Loaded {
    pub storage: Storage,
    pub index: LineIndex,
    pub longest: LongestLines,
    pub layout: TextLayout,
    pub stats: BuildStats,
    pub result: OperationResult,
}

/// Load `source` completely.
///
/// Cancellation and fatal errors still return whatever was indexed up to
/// that point; `result` tells them apart.
pub fn load(
    source: &mut dyn BlockSource,
    config: &Config,
    observer: &dyn Observer,
    cancel: &CancelToken,
) -> Loaded {
    let start = Instant::now();
    let kind = config.choose_storage(source.content_len(), source.path().is_some());
    let storage = Storage::new(kind, &config.storage_config(0), source.path());
    let mut builder = LineIndexBuilder::new(config.max_partial_size, config.split_lookback)
        .with_encoding(config.encoding);

    debug!(?kind, content_len = ?source.content_len(), "load started");

    let outcome = pump(source, &storage, &mut builder, config, observer, cancel);
    storage.finish();

    let stats = builder.stats();
    let detected = builder.encoding();
    let (index, longest) = builder.finish();
    let layout = TextLayout::new(
        detected.encoding,
        detected.bom_len,
        index.start_offset()..index.end_offset(),
    );

    let elapsed = start.elapsed();
    let result = match outcome {
        Ok(true) => {
            observer.on_progress(100);
            OperationResult::completed(elapsed)
        }
        Ok(false) => OperationResult::cancelled(elapsed),
        Err(e) => OperationResult::failed(elapsed, e),
    };

    info!(
        bytes = stats.bytes,
        lines = stats.lines,
        partials = stats.partial_lines,
        encoding = %detected.encoding,
        storage = ?storage.kind(),
        cancelled = result.cancelled,
        elapsed_ms = elapsed.as_millis() as u64,
        "load finished"
    );
    observer.on_load_complete(&result);

    Loaded {
        storage,
        index,
        longest,
        layout,
        stats,
        result,
    }
}

/// Move every block into storage and builder; `Ok(false)` when cancelled
fn pump(
    source: &mut dyn BlockSource,
    storage: &Storage,
    builder: &mut LineIndexBuilder,
    config: &Config,
    observer: &dyn Observer,
    cancel: &CancelToken,
) -> Result<bool> {
    let snapshot_interval = config.snapshot_interval();
    let mut last_snapshot = Instant::now();
    let mut last_percent = 0u8;

    loop {
        if cancel.is_cancelled() {
            return Ok(false);
        }

        let Some(block) = source.next_block().context("Failed to read input")? else {
            return Ok(true);
        };
        storage.write(block).context("Failed to store input")?;
        builder.push(block)?;

        if let Some(fraction) = source.progress() {
            let percent = (fraction.clamp(0.0, 1.0) * 100.0) as u8;
            if percent != last_percent {
                last_percent = percent;
                observer.on_progress(percent);
            }
        }

        if let Some(interval) = snapshot_interval
            && last_snapshot.elapsed() >= interval
        {
            last_snapshot = Instant::now();
            observer.on_snapshot(snapshot(storage, builder));
        }
    }
}

fn snapshot(storage: &Storage, builder: &LineIndexBuilder) -> Snapshot {
    // Chunks must not change representation under the snapshot's readers
    storage.drain();
    let index = builder.snapshot();
    let detected = builder.encoding();
    let layout = TextLayout::new(
        detected.encoding,
        detected.bom_len,
        index.start_offset()..index.end_offset(),
    );
    Snapshot {
        index,
        storage: storage.clone(),
        layout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeLimit;
    use crate::storage::StorageKind;
    use parking_lot::Mutex;
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder {
        percents: Mutex<Vec<u8>>,
        snapshots: Mutex<Vec<usize>>,
        completed: Mutex<Option<bool>>,
    }

    impl Observer for Recorder {
        fn on_progress(&self, percent: u8) {
            self.percents.lock().push(percent);
        }

        fn on_snapshot(&self, snapshot: Snapshot) {
            self.snapshots.lock().push(snapshot.partial_count());
        }

        fn on_load_complete(&self, result: &OperationResult) {
            *self.completed.lock() = Some(result.is_complete());
        }
    }

    fn lines(count: usize) -> Vec<u8> {
        (0..count).flat_map(|i| format!("line number {}\n", i).into_bytes()).collect()
    }

    #[test]
    fn test_load_from_reader() {
        let data = lines(50_000);
        let mut source = ReadSource::new(Cursor::new(data.clone()), Some(data.len() as u64));
        let observer = Recorder::default();
        let loaded = load(&mut source, &Config::default(), &observer, &CancelToken::new());

        assert!(loaded.result.is_complete());
        assert_eq!(loaded.index.partial_count(), 50_000);
        assert_eq!(loaded.stats.bytes, data.len() as u64);
        assert_eq!(loaded.storage.len(), data.len() as u64);
        assert_eq!(*observer.completed.lock(), Some(true));
        assert_eq!(observer.percents.lock().last(), Some(&100));

        let mut ctx = ThreadContext::new(&loaded.storage, loaded.layout);
        assert_eq!(ctx.partial_line(&loaded.index, 49_999).text, "line number 49999");
    }

    #[test]
    fn test_snapshots_grow() {
        let data = lines(200_000);
        let mut source = ReadSource::new(Cursor::new(data.clone()), Some(data.len() as u64));
        let config = Config {
            snapshot_interval_ms: 0,
            ..Config::default()
        };
        // Interval 0 disables snapshots
        let observer = Recorder::default();
        load(&mut source, &config, &observer, &CancelToken::new());
        assert!(observer.snapshots.lock().is_empty());

        let mut source = ReadSource::new(Cursor::new(data.clone()), Some(data.len() as u64));
        let config = Config {
            snapshot_interval_ms: 1,
            ..Config::default()
        };
        let observer = Recorder::default();
        load(&mut source, &config, &observer, &CancelToken::new());
        let snapshots = observer.snapshots.lock();
        assert!(snapshots.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cancelled_load_keeps_prefix() {
        let data = lines(10);
        let mut source = ReadSource::new(Cursor::new(data), None);
        let cancel = CancelToken::new();
        cancel.cancel();
        let loaded = load(&mut source, &Config::default(), &crate::events::NoopObserver, &cancel);
        assert!(loaded.result.cancelled);
        assert!(loaded.result.error.is_none());
        assert_eq!(loaded.index.partial_count(), 0);
    }

    #[test]
    fn test_read_error_is_fatal() {
        struct Broken;
        impl std::io::Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk on fire"))
            }
        }

        let mut source = ReadSource::new(Broken, None);
        let loaded = load(&mut source, &Config::default(), &crate::events::NoopObserver, &CancelToken::new());
        assert!(!loaded.result.cancelled);
        let error = loaded.result.error.expect("error expected");
        assert!(format!("{:#}", error).contains("disk on fire"));
    }

    #[test]
    fn test_large_plain_file_stays_on_disk() {
        use std::io::Write;
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&lines(1000)).unwrap();
        tmp.flush().unwrap();

        let config = Config {
            memory_limit: SizeLimit::Bytes(100),
            compress_limit: SizeLimit::Bytes(1000),
            ..Config::default()
        };
        let mut source = open_path(tmp.path()).unwrap();
        let loaded = load(source.as_mut(), &config, &crate::events::NoopObserver, &CancelToken::new());
        assert_eq!(loaded.storage.kind(), StorageKind::File);
        let mut ctx = ThreadContext::new(&loaded.storage, loaded.layout);
        assert_eq!(ctx.partial_line(&loaded.index, 999).text, "line number 999");
    }
}
