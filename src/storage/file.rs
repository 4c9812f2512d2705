//! Storage that leaves content in the source file.
//!
//! Used for plain files too large to keep in memory. Nothing is copied on
//! write; readers re-read the file through their own handle.

use crate::storage::StorageError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Inner {
    path: PathBuf,
    len: AtomicU64,
}

#[derive(Clone)]
pub struct FileStorage {
    inner: Arc<Inner>,
}

impl FileStorage {
    pub fn new(path: &Path) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.to_path_buf(),
                len: AtomicU64::new(0),
            }),
        }
    }

    /// Record that the next `count` bytes of the file have been loaded
    pub fn advance(&self, count: usize) {
        self.inner.len.fetch_add(count as u64, Ordering::AcqRel);
    }

    pub fn len(&self) -> u64 {
        self.inner.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn reader(&self) -> FileReader {
        FileReader {
            inner: self.inner.clone(),
            file: None,
        }
    }
}

/// Reader owning its own file handle, opened on first use
pub struct FileReader {
    inner: Arc<Inner>,
    file: Option<File>,
}

impl FileReader {
    pub fn read_into(&mut self, position: u64, count: usize, out: &mut Vec<u8>) -> Result<(), StorageError> {
        let end = self.inner.len.load(Ordering::Acquire);
        if position + count as u64 > end {
            return Err(StorageError::OutOfRange {
                position,
                count,
                start: 0,
                end,
            });
        }

        if self.file.is_none() {
            self.file = Some(File::open(&self.inner.path)?);
        }
        let file = self
            .file
            .as_mut()
            .ok_or(StorageError::Internal("file handle missing"))?;

        file.seek(SeekFrom::Start(position))?;
        let old_len = out.len();
        out.resize(old_len + count, 0);
        if let Err(e) = file.read_exact(&mut out[old_len..]) {
            out.truncate(old_len);
            return Err(e.into());
        }
        Ok(())
    }
}
