//! Byte block sources feeding the loader.

use anyhow::{bail, Context, Result};
use flate2::read::{DeflateDecoder, MultiGzDecoder};
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use zip::{CompressionMethod, ZipArchive};

/// Size of the blocks handed to the loader
pub const BLOCK_SIZE: usize = 256 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

/// Ordered sequence of content blocks ending with `None`
pub trait BlockSource: Send {
    fn next_block(&mut self) -> io::Result<Option<&[u8]>>;

    /// Content length when known up front
    fn content_len(&self) -> Option<u64> {
        None
    }

    /// Fraction of the input consumed, if measurable
    fn progress(&self) -> Option<f64> {
        None
    }

    /// Plain file the content can be re-read from
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Source over any reader
pub struct ReadSource<R> {
    reader: R,
    buf: Vec<u8>,
    content_len: Option<u64>,
    read: u64,
    /// Bytes consumed from the underlying input and its total, when they
    /// differ from the content (compressed input)
    input: Option<(Arc<AtomicU64>, u64)>,
}

impl<R: Read + Send> ReadSource<R> {
    pub fn new(reader: R, content_len: Option<u64>) -> Self {
        Self {
            reader,
            buf: vec![0; BLOCK_SIZE],
            content_len,
            read: 0,
            input: None,
        }
    }

    fn with_input_progress(mut self, consumed: Arc<AtomicU64>, total: u64) -> Self {
        self.input = Some((consumed, total));
        self
    }
}

impl<R: Read + Send> BlockSource for ReadSource<R> {
    fn next_block(&mut self) -> io::Result<Option<&[u8]>> {
        // Fill whole blocks so encoding detection sees enough bytes
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.read += filled as u64;
        Ok((filled > 0).then(|| &self.buf[..filled]))
    }

    fn content_len(&self) -> Option<u64> {
        self.content_len
    }

    fn progress(&self) -> Option<f64> {
        match &self.input {
            Some((consumed, total)) => {
                Some(consumed.load(Ordering::Relaxed) as f64 / (*total).max(1) as f64)
            }
            None => self
                .content_len
                .map(|len| self.read as f64 / len.max(1) as f64),
        }
    }
}

/// Source over a memory-mapped plain file
pub struct MmapSource {
    path: PathBuf,
    map: Mmap,
    pos: usize,
}

impl MmapSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        // SAFETY: the map is read-only; the file is expected not to be
        // truncated while it is being loaded
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self {
            path: path.to_path_buf(),
            map,
            pos: 0,
        })
    }
}

impl BlockSource for MmapSource {
    fn next_block(&mut self) -> io::Result<Option<&[u8]>> {
        if self.pos >= self.map.len() {
            return Ok(None);
        }
        let end = (self.pos + BLOCK_SIZE).min(self.map.len());
        let block = &self.map[self.pos..end];
        self.pos = end;
        Ok(Some(block))
    }

    fn content_len(&self) -> Option<u64> {
        Some(self.map.len() as u64)
    }

    fn progress(&self) -> Option<f64> {
        Some(self.pos as f64 / self.map.len().max(1) as f64)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Reader counting the bytes that pass through it
struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Open a file as a block source, decompressing gzip and zip input
/// transparently.
///
/// Both are recognised by their magic bytes, not the file name. Concatenated
/// gzip members are read as one stream; of a zip archive the first file
/// member is loaded.
pub fn open_path(path: &Path) -> Result<Box<dyn BlockSource>> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let len = file.metadata()?.len();

    let mut magic = [0u8; 4];
    let sniffed = if len >= 2 {
        let n = file.read(&mut magic)?;
        &magic[..n]
    } else {
        &magic[..0]
    };

    if sniffed.starts_with(&ZIP_MAGIC) {
        return open_zip_member(path, None);
    }

    if sniffed.starts_with(&GZIP_MAGIC) {
        let file = File::open(path)?;
        let consumed = Arc::new(AtomicU64::new(0));
        let counting = CountingReader {
            inner: file,
            count: consumed.clone(),
        };
        let decoder = MultiGzDecoder::new(BufReader::new(counting));
        return Ok(Box::new(ReadSource::new(decoder, None).with_input_progress(consumed, len)));
    }

    if len == 0 {
        // Empty files cannot be mapped on every platform
        return Ok(Box::new(ReadSource::new(io::empty(), Some(0))));
    }
    Ok(Box::new(MmapSource::open(path)?))
}

/// Open one member of a zip archive: the member called `name`, or the first
/// file member.
///
/// The member is streamed straight from the archive file; stored and deflated
/// members are supported.
pub fn open_zip_member(path: &Path, name: Option<&str>) -> Result<Box<dyn BlockSource>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read zip archive {}", path.display()))?;

    let mut found = None;
    for i in 0..archive.len() {
        let member = archive.by_index_raw(i)?;
        if member.is_dir() || !name.is_none_or(|n| member.name() == n) {
            continue;
        }
        found = Some((
            member.name().to_string(),
            member.compression(),
            member.data_start(),
            member.compressed_size(),
            member.size(),
        ));
        break;
    }
    let Some((member, method, data_start, compressed_size, size)) = found else {
        match name {
            Some(name) => bail!("{} has no member named '{}'", path.display(), name),
            None => bail!("{} contains no files", path.display()),
        }
    };
    debug!(member = %member, method = ?method, size, "reading zip member");

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(data_start))?;
    let consumed = Arc::new(AtomicU64::new(0));
    let raw = CountingReader {
        inner: BufReader::new(file).take(compressed_size),
        count: consumed.clone(),
    };
    let reader: Box<dyn Read + Send> = match method {
        CompressionMethod::Stored => Box::new(raw),
        CompressionMethod::Deflated => Box::new(DeflateDecoder::new(raw)),
        other => bail!("zip member '{}' uses unsupported compression {:?}", member, other),
    };
    Ok(Box::new(
        ReadSource::new(reader, Some(size)).with_input_progress(consumed, compressed_size),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn drain(source: &mut dyn BlockSource) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(block) = source.next_block().unwrap() {
            out.extend_from_slice(block);
        }
        out
    }

    #[test]
    fn test_read_source_fills_blocks() {
        let data = vec![b'x'; BLOCK_SIZE + 10];
        // A reader that hands out 7 bytes per call
        struct Trickle<'a>(&'a [u8]);
        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = buf.len().min(7).min(self.0.len());
                buf[..n].copy_from_slice(&self.0[..n]);
                self.0 = &self.0[n..];
                Ok(n)
            }
        }

        let mut source = ReadSource::new(Trickle(&data), Some(data.len() as u64));
        assert_eq!(source.next_block().unwrap().map(<[u8]>::len), Some(BLOCK_SIZE));
        assert_eq!(source.next_block().unwrap().map(<[u8]>::len), Some(10));
        assert!(source.next_block().unwrap().is_none());
        assert_eq!(source.progress(), Some(1.0));
    }

    #[test]
    fn test_open_plain_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"aap\nnoot\n").unwrap();
        tmp.flush().unwrap();

        let mut source = open_path(tmp.path()).unwrap();
        assert_eq!(source.content_len(), Some(9));
        assert_eq!(source.path(), Some(tmp.path()));
        assert_eq!(drain(source.as_mut()), b"aap\nnoot\n");
    }

    #[test]
    fn test_open_gzip_members() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        for part in [&b"first\n"[..], b"second\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            tmp.write_all(&encoder.finish().unwrap()).unwrap();
        }
        tmp.flush().unwrap();

        let mut source = open_path(tmp.path()).unwrap();
        assert_eq!(source.content_len(), None);
        assert!(source.path().is_none());
        assert_eq!(drain(source.as_mut()), b"first\nsecond\n");
        assert_eq!(source.progress(), Some(1.0));
    }

    fn write_zip(path: &Path) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.add_directory("logs/", SimpleFileOptions::default()).unwrap();
        zip.start_file("logs/app.log", deflated).unwrap();
        zip.write_all(&b"app line\n".repeat(1000)).unwrap();
        zip.start_file("notes.txt", stored).unwrap();
        zip.write_all(b"aap\nnoot\n").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_open_zip_first_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.zip");
        write_zip(&path);

        let mut source = open_path(&path).unwrap();
        assert_eq!(source.content_len(), Some(9000));
        assert!(source.path().is_none());
        assert_eq!(drain(source.as_mut()), b"app line\n".repeat(1000));
        assert_eq!(source.progress(), Some(1.0));
    }

    #[test]
    fn test_open_zip_member_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.zip");
        write_zip(&path);

        let mut source = open_zip_member(&path, Some("notes.txt")).unwrap();
        assert_eq!(drain(source.as_mut()), b"aap\nnoot\n");
        assert!(open_zip_member(&path, Some("missing.txt")).is_err());
    }

    #[test]
    fn test_open_empty_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut source = open_path(tmp.path()).unwrap();
        assert!(source.next_block().unwrap().is_none());
    }
}
