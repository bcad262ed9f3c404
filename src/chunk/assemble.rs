//! Download-side reassembly of chunked objects.
//!
//! Candidate keys are those matching `^<base>\.\d{3,5}$`.  They are sorted
//! by the integer value of their suffix (listing order is alphabetical,
//! which puts `.1000` before `.999`) and then streamed into the output in
//! order.  Before a chunk is written its key must equal the key the
//! uploader would have produced for the expected sequence number;
//! otherwise assembly stops with [`TransferError::SequenceGap`] and the
//! sink keeps whatever was written so far.

use regex::Regex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::plan::chunk_key;
use crate::errors::TransferError;
use crate::storage::backend::{FetchedObject, ObjectStoreClient};

/// Progress of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// Nothing fetched yet.
    Idle,
    /// Chunks `0..n` have been written; chunk `n` is next.
    Expecting(u32),
    /// Every candidate was written in order.
    Complete,
    /// Assembly stopped; the sink may hold a prefix of the object.
    Failed,
}

/// Summary of a finished assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Keys written, in order.
    pub keys: Vec<String>,
    /// Total bytes written to the sink.
    pub bytes: u64,
}

/// Build the matcher for chunk keys of `base_key`.
pub fn chunk_key_pattern(base_key: &str) -> Regex {
    let pattern = format!(r"^{}\.\d{{3,5}}$", regex::escape(base_key));
    // The base key is escaped, so the pattern is always valid.
    Regex::new(&pattern)
        .unwrap_or_else(|e| unreachable!("invalid chunk pattern {pattern}: {e}"))
}

/// Numeric value of the suffix after the last '.', if it is all digits.
pub fn chunk_sequence(key: &str) -> Option<u32> {
    let (_, suffix) = key.rsplit_once('.')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Keep the keys that are chunks of `base_key` and order them by the
/// integer value of their suffix.
pub fn select_chunk_keys<I>(base_key: &str, keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let pattern = chunk_key_pattern(base_key);
    let mut selected: Vec<String> = keys.into_iter().filter(|k| pattern.is_match(k)).collect();
    sort_by_sequence(&mut selected);
    selected
}

/// Sort chunk keys by the integer value of their suffix.  The sort is
/// stable, so duplicates such as `.001`/`.0001` keep listing order and are
/// caught during assembly.
pub fn sort_by_sequence(keys: &mut [String]) {
    keys.sort_by_key(|k| chunk_sequence(k).unwrap_or(u32::MAX));
}

/// Streams chunk objects into an output sink in sequence order.
pub struct ChunkAssembler<'a> {
    client: &'a dyn ObjectStoreClient,
    bucket: &'a str,
    state: AssemblyState,
    bytes: u64,
}

impl<'a> ChunkAssembler<'a> {
    /// Create an assembler reading from `bucket`.
    pub fn new(client: &'a dyn ObjectStoreClient, bucket: &'a str) -> Self {
        Self {
            client,
            bucket,
            state: AssemblyState::Idle,
            bytes: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Reassemble `base_key` from `candidates`, which must already be
    /// filtered and sorted (see [`select_chunk_keys`]).
    pub async fn assemble<W>(
        &mut self,
        base_key: &str,
        candidates: &[String],
        sink: &mut W,
    ) -> Result<AssemblyReport, TransferError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if candidates.is_empty() {
            self.state = AssemblyState::Failed;
            return Err(TransferError::not_found(base_key));
        }

        let mut expected = 0u32;
        self.state = AssemblyState::Expecting(expected);
        let mut written = Vec::with_capacity(candidates.len());

        for key in candidates {
            if *key != chunk_key(base_key, expected) {
                debug!("chunk {} found where sequence {} was expected", key, expected);
                self.state = AssemblyState::Failed;
                return Err(TransferError::SequenceGap { expected });
            }

            if let Err(e) = self.copy_object(key, sink).await {
                self.state = AssemblyState::Failed;
                return Err(e);
            }
            written.push(key.clone());
            expected += 1;
            self.state = AssemblyState::Expecting(expected);
        }

        if let Err(e) = sink.flush().await {
            self.state = AssemblyState::Failed;
            return Err(e.into());
        }
        self.state = AssemblyState::Complete;

        Ok(AssemblyReport {
            keys: written,
            bytes: self.bytes,
        })
    }

    /// Write a single, non-chunked object that the caller has already
    /// fetched.  The sink can therefore be opened only once the store has
    /// answered.
    pub async fn write_whole<W>(
        &mut self,
        key: &str,
        mut object: FetchedObject,
        sink: &mut W,
    ) -> Result<AssemblyReport, TransferError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        info!("Reading from {}/{}", self.bucket, key);
        let result = match tokio::io::copy(&mut object.body, sink).await {
            Ok(n) => {
                self.bytes += n;
                sink.flush().await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.state = AssemblyState::Complete;
                Ok(AssemblyReport {
                    keys: vec![key.to_string()],
                    bytes: self.bytes,
                })
            }
            Err(e) => {
                self.state = AssemblyState::Failed;
                Err(e.into())
            }
        }
    }

    async fn copy_object<W>(&mut self, key: &str, sink: &mut W) -> Result<(), TransferError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut object = self.client.get(self.bucket, key).await?;
        info!("Reading from {}/{}", self.bucket, key);
        let n = tokio::io::copy(&mut object.body, sink).await?;
        self.bytes += n;
        Ok(())
    }
}
