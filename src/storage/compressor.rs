//! Background chunk compression.
//!
//! Completed chunks are handed to a single worker thread through a bounded
//! channel. The writer blocks when the worker falls behind, which keeps the
//! number of raw chunks in flight bounded. Callers wait for the queue to empty
//! with [`Compressor::drain`].

use crate::storage::chunk::{self, Chunk};
use crate::storage::chunked::Shared;
use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Maximum number of chunks waiting for compression
pub const QUEUE_DEPTH: usize = 8;

/// Count of queued chunks plus the condition signalled when it reaches zero
#[derive(Default)]
pub struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

pub struct Compressor {
    tx: Option<Sender<usize>>,
    handle: Option<JoinHandle<()>>,
    pending: Arc<Pending>,
}

impl Compressor {
    pub fn spawn(shared: Arc<Shared>) -> std::io::Result<Self> {
        let (tx, rx) = channel::bounded::<usize>(QUEUE_DEPTH);
        let pending = Arc::new(Pending::default());
        let worker_pending = pending.clone();

        let handle = thread::Builder::new()
            .name("linex-compress".to_string())
            .spawn(move || {
                while let Ok(index) = rx.recv() {
                    if shared.compression_enabled.load(Ordering::Acquire) {
                        compress_chunk(&shared, index);
                    }
                    worker_pending.done();
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            pending,
        })
    }

    /// Queue a completed chunk
    pub fn submit(&self, index: usize) {
        if let Some(tx) = &self.tx {
            self.pending.add();
            if tx.send(index).is_err() {
                // Worker is gone; nothing will process this chunk
                self.pending.done();
            }
        }
    }

    /// Block until every submitted chunk has been processed
    pub fn drain(&self) {
        self.pending.wait_idle();
    }
}

impl Drop for Compressor {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn compress_chunk(shared: &Shared, index: usize) {
    let Some(slot) = shared.chunk(index) else {
        return;
    };

    let block = {
        let chunk = slot.read();
        let Chunk::Raw(raw) = &*chunk else {
            return;
        };
        match chunk::compress(raw) {
            Ok(block) if (block.len() as f64) <= raw.len() as f64 * shared.ratio => block,
            Ok(block) => {
                disable(
                    shared,
                    index,
                    &format!(
                        "ratio {:.2} above limit {:.2}",
                        block.len() as f64 / raw.len().max(1) as f64,
                        shared.ratio
                    ),
                );
                return;
            }
            Err(e) => {
                disable(shared, index, &e.to_string());
                return;
            }
        }
    };

    let mut chunk = slot.write();
    let raw_len = chunk.len();
    let previous = std::mem::replace(&mut *chunk, Chunk::Compressed { block, raw_len });
    drop(chunk);

    if let Chunk::Raw(buf) = previous {
        shared.pool.give(buf);
    }
    debug!(chunk = index, "chunk compressed");
}

fn disable(shared: &Shared, index: usize, reason: &str) {
    if shared.compression_enabled.swap(false, Ordering::AcqRel) {
        warn!(chunk = index, reason, "disabling chunk compression");
    }
}
