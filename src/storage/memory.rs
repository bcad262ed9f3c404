//! In-memory object store.
//!
//! Buckets and objects are held in `tokio::sync::RwLock<BTreeMap<...>>`
//! maps, so listings come back in key order like S3.  Nothing is
//! persisted; the store lives as long as the process.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::Read;
use std::pin::Pin;

use super::backend::{
    BucketEntry, FetchedObject, ListEntry, ListPage, ObjectMetadata, ObjectStoreClient, PutAck,
    PutHeaders, PutSource,
};

/// A stored object and the headers it was written with.
#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    etag: String,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

/// One bucket: creation time plus key-ordered objects.
#[derive(Debug, Default)]
struct MemoryBucket {
    created: Option<DateTime<Utc>>,
    objects: BTreeMap<String, MemoryObject>,
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: tokio::sync::RwLock<BTreeMap<String, MemoryBucket>>,
}

impl MemoryObjectStore {
    /// Create an empty store with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `bucket` if it does not exist yet.
    pub async fn create_bucket(&self, bucket: &str) {
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(bucket.to_string())
            .or_insert_with(|| MemoryBucket {
                created: Some(Utc::now()),
                objects: BTreeMap::new(),
            });
    }

    /// Store `data` directly under `bucket`/`key`, creating the bucket.
    pub async fn put_bytes(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> String {
        self.create_bucket(bucket).await;
        let data = data.into();
        let etag = Self::compute_etag(&data);
        let mut buckets = self.buckets.write().await;
        if let Some(b) = buckets.get_mut(bucket) {
            b.objects.insert(
                key.to_string(),
                MemoryObject {
                    data,
                    etag: etag.clone(),
                    content_type: None,
                    last_modified: Utc::now(),
                },
            );
        }
        etag
    }

    /// Number of objects currently stored in `bucket`.
    pub async fn object_count(&self, bucket: &str) -> usize {
        let buckets = self.buckets.read().await;
        buckets.get(bucket).map(|b| b.objects.len()).unwrap_or(0)
    }

    /// Compute the quoted MD5-hex ETag for a byte slice.
    fn compute_etag(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        format!("\"{}\"", hex::encode(hasher.finalize()))
    }

    fn read_source(source: &PutSource) -> anyhow::Result<Bytes> {
        let mut reader = source.open_range()?;
        let mut buf = Vec::with_capacity(source.length as usize);
        reader.read_to_end(&mut buf)?;
        if buf.len() as u64 != source.length {
            anyhow::bail!(
                "short read from {}: wanted {} bytes at offset {}, got {}",
                source.path.display(),
                source.length,
                source.offset,
                buf.len()
            );
        }
        Ok(Bytes::from(buf))
    }
}

impl ObjectStoreClient for MemoryObjectStore {
    fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &PutSource,
        headers: &PutHeaders,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<PutAck>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let source = source.clone();
        let content_type = headers.content_type.clone();
        Box::pin(async move {
            let data = Self::read_source(&source)?;
            let etag = Self::compute_etag(&data);

            let mut buckets = self.buckets.write().await;
            let b = buckets
                .get_mut(&bucket)
                .ok_or_else(|| anyhow::anyhow!("The specified bucket does not exist: {bucket}"))?;
            b.objects.insert(
                key,
                MemoryObject {
                    data,
                    etag: etag.clone(),
                    content_type,
                    last_modified: Utc::now(),
                },
            );

            Ok(PutAck { etag })
        })
    }

    fn get(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<FetchedObject>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            let b = buckets
                .get(&bucket)
                .ok_or_else(|| anyhow::anyhow!("The specified bucket does not exist: {bucket}"))?;
            let obj = b
                .objects
                .get(&key)
                .ok_or_else(|| anyhow::anyhow!("The specified key does not exist: {bucket}/{key}"))?;

            let metadata = ObjectMetadata {
                content_length: Some(obj.data.len() as u64),
                content_type: obj.content_type.clone(),
                last_modified: Some(obj.last_modified),
            };
            Ok(FetchedObject {
                body: Box::pin(std::io::Cursor::new(obj.data.clone())),
                metadata,
            })
        })
    }

    fn list_bucket(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        max_keys: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ListPage>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let marker = marker.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            let b = buckets
                .get(&bucket)
                .ok_or_else(|| anyhow::anyhow!("The specified bucket does not exist: {bucket}"))?;

            let mut matching = b
                .objects
                .iter()
                .filter(|(k, _)| k.starts_with(&prefix) && k.as_str() > marker.as_str())
                .map(|(k, obj)| ListEntry {
                    key: k.clone(),
                    size: obj.data.len() as u64,
                    last_modified: Some(obj.last_modified),
                    etag: Some(obj.etag.clone()),
                });

            let entries: Vec<ListEntry> = matching.by_ref().take(max_keys as usize).collect();
            let is_truncated = matching.next().is_some();

            Ok(ListPage {
                entries,
                is_truncated,
            })
        })
    }

    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<BucketEntry>>> + Send + '_>> {
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            Ok(buckets
                .iter()
                .map(|(name, b)| BucketEntry {
                    name: name.clone(),
                    created: b.created,
                })
                .collect())
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
