//! Upload-side chunk layout.
//!
//! A file is split into consecutive byte ranges of `chunk_size` bytes
//! (the last one possibly shorter).  Chunk `n` of base key `k` is stored
//! as `k.nnn`, zero-padded to three digits, so at most [`MAX_CHUNKS`]
//! chunks can be ordered per file.

use std::num::NonZeroU64;

use crate::errors::TransferError;

/// Zero-padded width of the sequence suffix written on upload.
pub const SUFFIX_WIDTH: usize = 3;

/// Largest number of chunks a single file may be split into
/// (suffixes `.000` to `.999`).
pub const MAX_CHUNKS: u64 = 1000;

/// One chunk: a byte range of the source file and its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// Position of the chunk in the plan, starting at 0.
    pub sequence: u32,
    /// First byte of the range.
    pub offset: u64,
    /// Number of bytes in the range.
    pub length: u64,
}

/// Ordered chunk layout covering a whole file exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    chunks: Vec<ChunkSpec>,
    file_length: u64,
}

impl ChunkPlan {
    /// The chunks in sequence order.
    pub fn chunks(&self) -> &[ChunkSpec] {
        &self.chunks
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Always false: even an empty file has one (empty) chunk.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Length of the file this plan covers.
    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    /// Iterate over `(chunk key, chunk)` pairs for `base_key`.
    pub fn keyed<'a>(
        &'a self,
        base_key: &'a str,
    ) -> impl Iterator<Item = (String, ChunkSpec)> + 'a {
        self.chunks
            .iter()
            .map(move |c| (chunk_key(base_key, c.sequence), *c))
    }
}

/// Number of chunks a file of `file_length` bytes needs.
pub fn chunk_count(file_length: u64, chunk_size: NonZeroU64) -> u64 {
    file_length.div_ceil(chunk_size.get()).max(1)
}

/// Split `file_length` bytes into chunks of at most `chunk_size` bytes.
///
/// A zero-length file yields a single zero-length chunk so that it can
/// still be uploaded and downloaded in chunked mode.
pub fn plan_chunks(file_length: u64, chunk_size: NonZeroU64) -> ChunkPlan {
    let size = chunk_size.get();
    if file_length == 0 {
        return ChunkPlan {
            chunks: vec![ChunkSpec {
                sequence: 0,
                offset: 0,
                length: 0,
            }],
            file_length,
        };
    }

    let capacity = chunk_count(file_length, chunk_size).min(MAX_CHUNKS);
    let mut chunks = Vec::with_capacity(capacity as usize);
    let mut offset = 0u64;
    let mut sequence = 0u32;
    while offset < file_length {
        let length = size.min(file_length - offset);
        chunks.push(ChunkSpec {
            sequence,
            offset,
            length,
        });
        offset += length;
        sequence = sequence.saturating_add(1);
    }

    ChunkPlan {
        chunks,
        file_length,
    }
}

/// Plan the chunks of the file stored under `key`, rejecting files whose
/// sequence numbers would not fit the suffix.
pub fn plan_file(
    key: &str,
    file_length: u64,
    chunk_size: NonZeroU64,
) -> Result<ChunkPlan, TransferError> {
    let chunks = chunk_count(file_length, chunk_size);
    if chunks > MAX_CHUNKS {
        return Err(TransferError::TooManyChunks {
            key: key.to_string(),
            chunks,
            max: MAX_CHUNKS,
        });
    }
    Ok(plan_chunks(file_length, chunk_size))
}

/// Key of chunk `sequence` of `base_key`: `base.000`, `base.001`, ...
pub fn chunk_key(base_key: &str, sequence: u32) -> String {
    format!("{base_key}.{sequence:0width$}", width = SUFFIX_WIDTH)
}

/// Check that a non-chunked upload fits the store's object size limit.
pub fn check_single_part(
    key: &str,
    file_length: u64,
    max_object_size: u64,
) -> Result<(), TransferError> {
    if file_length > max_object_size {
        return Err(TransferError::SizeLimit {
            key: key.to_string(),
            size: file_length,
            max: max_object_size,
        });
    }
    Ok(())
}
