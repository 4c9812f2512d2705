use crate::storage::StorageError;

/// One fixed-capacity unit of storage
#[derive(Debug)]
pub enum Chunk {
    /// Write path: mutable, holds the bytes as written
    Raw(Vec<u8>),
    /// LZ4 block; replaces the raw buffer after a background pass
    Compressed { block: Vec<u8>, raw_len: usize },
}

impl Chunk {
    /// Number of content bytes this chunk represents
    pub fn len(&self) -> usize {
        match self {
            Chunk::Raw(buf) => buf.len(),
            Chunk::Compressed { raw_len, .. } => *raw_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes actually held in memory
    pub fn stored_len(&self) -> usize {
        match self {
            Chunk::Raw(buf) => buf.len(),
            Chunk::Compressed { block, .. } => block.len(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Chunk::Compressed { .. })
    }
}

/// Compress a raw chunk into an LZ4 block
pub fn compress(raw: &[u8]) -> Result<Vec<u8>, lz4_flex::block::CompressError> {
    let mut block = vec![0u8; lz4_flex::block::get_maximum_output_size(raw.len())];
    let written = lz4_flex::block::compress_into(raw, &mut block)?;
    block.truncate(written);
    Ok(block)
}

/// Decompress a chunk's block into `out`, replacing its contents
pub fn decompress_into(
    index: usize,
    block: &[u8],
    raw_len: usize,
    out: &mut Vec<u8>,
) -> Result<(), StorageError> {
    out.clear();
    out.resize(raw_len, 0);
    let written = lz4_flex::block::decompress_into(block, out).map_err(|e| {
        StorageError::Corrupt {
            chunk: index,
            reason: e.to_string(),
        }
    })?;
    if written != raw_len {
        return Err(StorageError::Corrupt {
            chunk: index,
            reason: format!("expected {} bytes, got {}", raw_len, written),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let raw: Vec<u8> = b"the quick brown fox ".repeat(200);
        let block = compress(&raw).unwrap();
        assert!(block.len() < raw.len());

        let mut out = Vec::new();
        decompress_into(0, &block, raw.len(), &mut out).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_corrupt_block_reports_chunk() {
        let mut out = Vec::new();
        let err = decompress_into(7, &[0xFF, 0xFF, 0xFF], 100, &mut out).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { chunk: 7, .. }));
    }
}
