//! Content storage.
//!
//! Loaded bytes live in one of three backends:
//!
//! - [`StorageKind::Memory`] - raw chunks in memory
//! - [`StorageKind::Compressed`] - chunks compressed with LZ4 by a background
//!   thread once they fill up
//! - [`StorageKind::File`] - nothing kept; readers go back to the source file
//!
//! All backends are append-only during load and read-shared afterwards. Each
//! consumer thread takes its own [`StorageReader`].

pub mod chunk;
pub mod chunked;
pub mod compressor;
pub mod file;
pub mod pool;

pub use chunked::{ChunkReader, ChunkedStorage};
pub use file::{FileReader, FileStorage};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default chunk capacity
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default compressed/raw size ratio above which compression is abandoned
pub const DEFAULT_COMPRESSION_RATIO: f32 = 0.6;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("read of {count} bytes at {position} outside stored range {start}..{end}")]
    OutOfRange {
        position: u64,
        count: usize,
        start: u64,
        end: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk {chunk} is corrupt: {reason}")]
    Corrupt { chunk: usize, reason: String },

    #[error("storage is sealed")]
    Sealed,

    #[error("internal storage error: {0}")]
    Internal(&'static str),
}

/// How readers decompress chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecompressMode {
    /// Keep the last decompressed chunk per reader
    #[default]
    Cached,
    /// Decompress on every read; diagnostic path
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    Memory,
    Compressed,
    File,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub chunk_size: usize,
    pub compression_ratio: f32,
    pub decompress_mode: DecompressMode,
    /// Raw buffers kept for reuse after compression
    pub pool_capacity: usize,
    /// Absolute offset of the first stored byte
    pub base_offset: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression_ratio: DEFAULT_COMPRESSION_RATIO,
            decompress_mode: DecompressMode::Cached,
            pool_capacity: 16,
            base_offset: 0,
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub total_bytes: u64,
    pub raw_chunks: usize,
    pub raw_bytes: u64,
    pub compressed_chunks: usize,
    pub compressed_bytes: u64,
    pub compression_enabled: bool,
}

impl StorageStats {
    /// Bytes held in memory
    pub fn resident_bytes(&self) -> u64 {
        self.raw_bytes + self.compressed_bytes
    }
}

/// Handle to the content of one loaded text. Cloning shares the content.
#[derive(Clone)]
pub enum Storage {
    Chunked(ChunkedStorage),
    File(FileStorage),
}

impl Storage {
    pub fn new(kind: StorageKind, config: &StorageConfig, source: Option<&Path>) -> Self {
        match (kind, source) {
            (StorageKind::File, Some(path)) => Storage::File(FileStorage::new(path)),
            (StorageKind::Compressed, _) => Storage::Chunked(ChunkedStorage::compressed(config)),
            _ => Storage::Chunked(ChunkedStorage::in_memory(config)),
        }
    }

    /// Kind chosen at creation. Compressed storage that gave up compressing
    /// still reports `Compressed`; see `StorageStats::compression_enabled`.
    pub fn kind(&self) -> StorageKind {
        match self {
            Storage::Chunked(s) if s.has_compressor() => StorageKind::Compressed,
            Storage::Chunked(_) => StorageKind::Memory,
            Storage::File(_) => StorageKind::File,
        }
    }

    pub fn write(&self, bytes: &[u8]) -> Result<(), StorageError> {
        match self {
            Storage::Chunked(s) => s.write(bytes),
            Storage::File(s) => {
                s.advance(bytes.len());
                Ok(())
            }
        }
    }

    pub fn finish(&self) {
        if let Storage::Chunked(s) = self {
            s.finish();
        }
    }

    /// Wait for background compression; required before snapshots and
    /// parallel searches
    pub fn drain(&self) {
        if let Storage::Chunked(s) = self {
            s.drain();
        }
    }

    pub fn base(&self) -> u64 {
        match self {
            Storage::Chunked(s) => s.base(),
            Storage::File(_) => 0,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Storage::Chunked(s) => s.len(),
            Storage::File(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute offset one past the last stored byte
    pub fn end(&self) -> u64 {
        self.base() + self.len()
    }

    pub fn reader(&self) -> StorageReader {
        match self {
            Storage::Chunked(s) => StorageReader::Chunked(s.reader()),
            Storage::File(s) => StorageReader::File(s.reader()),
        }
    }

    pub fn stats(&self) -> StorageStats {
        match self {
            Storage::Chunked(s) => s.stats(),
            Storage::File(s) => StorageStats {
                total_bytes: s.len(),
                ..StorageStats::default()
            },
        }
    }
}

/// Per-thread reader
pub enum StorageReader {
    Chunked(ChunkReader),
    File(FileReader),
}

impl StorageReader {
    /// Append `count` bytes at absolute `position` to `out`
    pub fn read_into(&mut self, position: u64, count: usize, out: &mut Vec<u8>) -> Result<(), StorageError> {
        match self {
            StorageReader::Chunked(r) => r.read_into(position, count, out),
            StorageReader::File(r) => r.read_into(position, count, out),
        }
    }

    pub fn read(&mut self, position: u64, count: usize) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::with_capacity(count);
        self.read_into(position, count, &mut out)?;
        Ok(out)
    }
}
