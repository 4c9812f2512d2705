//! In-memory chunked storage with optional background compression.

use crate::storage::chunk::{self, Chunk};
use crate::storage::compressor::Compressor;
use crate::storage::pool::BufferPool;
use crate::storage::{DecompressMode, StorageConfig, StorageError, StorageStats};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type Slot = Arc<RwLock<Chunk>>;

/// State shared between the writer, the readers and the compressor
pub struct Shared {
    pub(crate) base: u64,
    pub(crate) chunk_size: usize,
    pub(crate) ratio: f64,
    chunks: RwLock<Vec<Slot>>,
    len: AtomicU64,
    pub(crate) compression_enabled: AtomicBool,
    pub(crate) pool: BufferPool,
}

impl Shared {
    /// Resolve a chunk by index. Callers must not hold the returned slot
    /// across compressor passes; resolve again on every access.
    pub(crate) fn chunk(&self, index: usize) -> Option<Slot> {
        self.chunks.read().get(index).cloned()
    }

    fn end(&self) -> u64 {
        self.base + self.len.load(Ordering::Acquire)
    }
}

struct Inner {
    shared: Arc<Shared>,
    compressor: Option<Compressor>,
    decompress_mode: DecompressMode,
    sealed: AtomicBool,
    /// Serializes writers; the storage has a single producer
    write_lock: Mutex<()>,
}

/// Append-only byte store split into fixed-size chunks.
///
/// Cloning is cheap and shares the same chunks.
#[derive(Clone)]
pub struct ChunkedStorage {
    inner: Arc<Inner>,
}

impl ChunkedStorage {
    /// Storage that keeps every chunk raw
    pub fn in_memory(config: &StorageConfig) -> Self {
        Self::build(config, false).0
    }

    /// Storage that compresses completed chunks in the background.
    ///
    /// Falls back to raw storage if the compressor thread cannot be started.
    pub fn compressed(config: &StorageConfig) -> Self {
        let (storage, started) = Self::build(config, true);
        if !started {
            tracing::warn!("compressor thread unavailable, storing chunks raw");
        }
        storage
    }

    fn build(config: &StorageConfig, compress: bool) -> (Self, bool) {
        let shared = Arc::new(Shared {
            base: config.base_offset,
            chunk_size: config.chunk_size.max(1),
            ratio: config.compression_ratio as f64,
            chunks: RwLock::new(Vec::new()),
            len: AtomicU64::new(0),
            compression_enabled: AtomicBool::new(compress),
            pool: BufferPool::new(config.pool_capacity),
        });

        let compressor = if compress {
            Compressor::spawn(shared.clone()).ok()
        } else {
            None
        };
        let started = compressor.is_some();
        if !started {
            shared.compression_enabled.store(false, Ordering::Release);
        }

        let storage = Self {
            inner: Arc::new(Inner {
                shared,
                compressor,
                decompress_mode: config.decompress_mode,
                sealed: AtomicBool::new(false),
                write_lock: Mutex::new(()),
            }),
        };
        (storage, started || !compress)
    }

    /// Append bytes at the tail
    pub fn write(&self, mut bytes: &[u8]) -> Result<(), StorageError> {
        let _guard = self.inner.write_lock.lock();
        if self.inner.sealed.load(Ordering::Acquire) {
            return Err(StorageError::Sealed);
        }

        let shared = &self.inner.shared;
        let size = shared.chunk_size;

        while !bytes.is_empty() {
            let written = shared.len.load(Ordering::Acquire);
            let index = (written / size as u64) as usize;
            let within = (written % size as u64) as usize;

            let slot = if within == 0 {
                let slot = Arc::new(RwLock::new(Chunk::Raw(shared.pool.take(size))));
                shared.chunks.write().push(slot.clone());
                slot
            } else {
                shared.chunk(index).ok_or(StorageError::Internal("missing tail chunk"))?
            };

            let take = (size - within).min(bytes.len());
            match &mut *slot.write() {
                Chunk::Raw(buf) => buf.extend_from_slice(&bytes[..take]),
                Chunk::Compressed { .. } => {
                    return Err(StorageError::Internal("tail chunk already compressed"));
                }
            }
            shared.len.fetch_add(take as u64, Ordering::AcqRel);

            if within + take == size {
                self.submit(index);
            }
            bytes = &bytes[take..];
        }

        Ok(())
    }

    fn submit(&self, index: usize) {
        if let Some(compressor) = &self.inner.compressor {
            if self.inner.shared.compression_enabled.load(Ordering::Acquire) {
                compressor.submit(index);
            }
        }
    }

    /// Seal the storage at end of load; the partial tail chunk is queued too
    pub fn finish(&self) {
        let _guard = self.inner.write_lock.lock();
        if self.inner.sealed.swap(true, Ordering::AcqRel) {
            return;
        }
        let shared = &self.inner.shared;
        let written = shared.len.load(Ordering::Acquire);
        let size = shared.chunk_size as u64;
        if written % size != 0 {
            self.submit((written / size) as usize);
        }
    }

    /// Wait for the compressor to process every queued chunk
    pub fn drain(&self) {
        if let Some(compressor) = &self.inner.compressor {
            compressor.drain();
        }
    }

    pub fn base(&self) -> u64 {
        self.inner.shared.base
    }

    /// Bytes written, base offset excluded
    pub fn len(&self) -> u64 {
        self.inner.shared.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_compressing(&self) -> bool {
        self.inner.shared.compression_enabled.load(Ordering::Acquire)
    }

    /// Whether a compressor was started; fixed for the lifetime of the storage
    pub fn has_compressor(&self) -> bool {
        self.inner.compressor.is_some()
    }

    /// Independent reader with its own decompression cache
    pub fn reader(&self) -> ChunkReader {
        ChunkReader {
            shared: self.inner.shared.clone(),
            mode: self.inner.decompress_mode,
            cache_index: None,
            cache: Vec::new(),
        }
    }

    pub fn stats(&self) -> StorageStats {
        let shared = &self.inner.shared;
        let mut stats = StorageStats {
            total_bytes: self.len(),
            compression_enabled: self.is_compressing(),
            ..StorageStats::default()
        };
        for slot in shared.chunks.read().iter() {
            let chunk = slot.read();
            if chunk.is_compressed() {
                stats.compressed_chunks += 1;
                stats.compressed_bytes += chunk.stored_len() as u64;
            } else {
                stats.raw_chunks += 1;
                stats.raw_bytes += chunk.stored_len() as u64;
            }
        }
        stats
    }

    /// Per-chunk `(raw_len, stored_len)` pairs, in order
    pub fn chunk_sizes(&self) -> Vec<(usize, usize)> {
        self.inner
            .shared
            .chunks
            .read()
            .iter()
            .map(|slot| {
                let chunk = slot.read();
                (chunk.len(), chunk.stored_len())
            })
            .collect()
    }
}

/// Reader over a [`ChunkedStorage`], one per consumer thread
pub struct ChunkReader {
    shared: Arc<Shared>,
    mode: DecompressMode,
    cache_index: Option<usize>,
    cache: Vec<u8>,
}

impl ChunkReader {
    /// Append `count` bytes starting at absolute `position` to `out`
    pub fn read_into(&mut self, position: u64, count: usize, out: &mut Vec<u8>) -> Result<(), StorageError> {
        let start = self.shared.base;
        let end = self.shared.end();
        if position < start || position + count as u64 > end {
            return Err(StorageError::OutOfRange {
                position,
                count,
                start,
                end,
            });
        }

        let size = self.shared.chunk_size as u64;
        let mut rel = position - start;
        let mut remaining = count;

        while remaining > 0 {
            let index = (rel / size) as usize;
            let within = (rel % size) as usize;
            let take = (self.shared.chunk_size - within).min(remaining);

            self.copy_from_chunk(index, within, take, out)?;

            rel += take as u64;
            remaining -= take;
        }

        Ok(())
    }

    fn copy_from_chunk(
        &mut self,
        index: usize,
        within: usize,
        take: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), StorageError> {
        if self.mode == DecompressMode::Cached && self.cache_index == Some(index) {
            out.extend_from_slice(&self.cache[within..within + take]);
            return Ok(());
        }

        let slot = self
            .shared
            .chunk(index)
            .ok_or(StorageError::Internal("chunk index past the chunk list"))?;
        let chunk = slot.read();

        match &*chunk {
            Chunk::Raw(buf) => {
                let bytes = buf
                    .get(within..within + take)
                    .ok_or(StorageError::Internal("raw chunk shorter than its length"))?;
                out.extend_from_slice(bytes);
            }
            Chunk::Compressed { block, raw_len } => match self.mode {
                DecompressMode::Cached => {
                    self.cache_index = None;
                    chunk::decompress_into(index, block, *raw_len, &mut self.cache)?;
                    self.cache_index = Some(index);
                    out.extend_from_slice(&self.cache[within..within + take]);
                }
                DecompressMode::Direct => {
                    let mut scratch = Vec::new();
                    chunk::decompress_into(index, block, *raw_len, &mut scratch)?;
                    out.extend_from_slice(&scratch[within..within + take]);
                }
            },
        }

        Ok(())
    }
}
