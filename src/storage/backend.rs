//! Abstract object store client trait.
//!
//! Every object store must implement [`ObjectStoreClient`].  The trait
//! works in terms of local byte ranges for writes and opaque async
//! readers for reads, so the transfer code never holds a whole object in
//! memory and does not need to know the underlying medium.

use chrono::{DateTime, Utc};
use std::fs::File;
use std::future::Future;
use std::io::{Read, Seek, SeekFrom, Take};
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Streaming body of a fetched object.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// A byte range of a local file to be written as one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutSource {
    /// File to read from.
    pub path: PathBuf,
    /// First byte of the range.
    pub offset: u64,
    /// Number of bytes in the range.
    pub length: u64,
}

impl PutSource {
    /// A range covering `length` bytes from the start of `path`.
    pub fn whole(path: impl Into<PathBuf>, length: u64) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            length,
        }
    }

    /// Open the file positioned at `offset`, limited to `length` bytes.
    pub fn open_range(&self) -> std::io::Result<Take<File>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        Ok(file.take(self.length))
    }
}

/// Request headers attached to a put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutHeaders {
    /// `Content-Type` of the stored object.
    pub content_type: Option<String>,
    /// Canned ACL directive (e.g. `public-read`), passed through verbatim.
    pub acl: Option<String>,
}

/// Store acknowledgement of a put.
#[derive(Debug, Clone)]
pub struct PutAck {
    /// Quoted ETag returned by the store.
    pub etag: String,
}

/// Metadata returned alongside a fetched object.
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    /// Body length, when the store reports it.
    pub content_length: Option<u64>,
    /// `Content-Type`, when set.
    pub content_type: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A fetched object: streaming body plus metadata.
pub struct FetchedObject {
    /// Object bytes.
    pub body: ObjectReader,
    /// Object metadata.
    pub metadata: ObjectMetadata,
}

/// One remote object in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Full object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// Quoted ETag, when the store reports one.
    pub etag: Option<String>,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Entries in store order.
    pub entries: Vec<ListEntry>,
    /// Whether more entries follow the last one in this page.
    pub is_truncated: bool,
}

/// One bucket owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    /// Bucket name.
    pub name: String,
    /// Creation time, when reported.
    pub created: Option<DateTime<Utc>>,
}

/// Async object store contract.
///
/// Every call is a single network round trip (or its local equivalent);
/// implementations do not retry.
pub trait ObjectStoreClient: Send + Sync + 'static {
    /// Write the bytes described by `source` to `bucket`/`key`.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &PutSource,
        headers: &PutHeaders,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<PutAck>> + Send + '_>>;

    /// Open the object at `bucket`/`key` for streaming.
    fn get(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<FetchedObject>> + Send + '_>>;

    /// Return up to `max_keys` entries whose keys start with `prefix` and
    /// sort after `marker` (an empty marker starts from the beginning).
    fn list_bucket(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        max_keys: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ListPage>> + Send + '_>>;

    /// List all buckets visible to the caller.
    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<BucketEntry>>> + Send + '_>>;
}
