//! Local filesystem object store.
//!
//! Each bucket is a directory under a configurable root, and each object
//! is a file at `root/bucket/key` (keys containing '/' become nested
//! directories).  Useful for trying the tool without a remote store.
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::future::Future;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tracing::debug;

use super::backend::{
    BucketEntry, FetchedObject, ListEntry, ListPage, ObjectMetadata, ObjectStoreClient, PutAck,
    PutHeaders, PutSource,
};

/// Name of the scratch directory for atomic writes.  Never a bucket.
const TMP_DIR: &str = ".tmp";

/// Stores objects on the local filesystem.
pub struct LocalObjectStore {
    /// Root directory; each subdirectory is a bucket.
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a new `LocalObjectStore` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(TMP_DIR))?;
        Ok(Self { root })
    }

    /// Create a bucket directory.
    pub fn create_bucket(&self, bucket: &str) -> anyhow::Result<()> {
        let dir = self.bucket_dir(bucket)?;
        std::fs::create_dir_all(dir)?;
        Ok(())
    }

    /// Resolve a bucket name to its directory, rejecting names that would
    /// escape the root.
    fn bucket_dir(&self, bucket: &str) -> anyhow::Result<PathBuf> {
        if bucket.is_empty() || bucket == TMP_DIR || bucket.contains('/') || bucket == ".." {
            anyhow::bail!("Invalid bucket name: {bucket:?}");
        }
        Ok(self.root.join(bucket))
    }

    /// Resolve a bucket/key pair to an absolute file path.
    ///
    /// Keys containing `..` components are rejected so that a key can
    /// never address a file outside its bucket directory.
    fn resolve(&self, bucket: &str, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() || key.ends_with('/') {
            anyhow::bail!("Invalid object key: {key:?}");
        }
        for component in Path::new(key).components() {
            match component {
                Component::Normal(_) => {}
                _ => anyhow::bail!("Path traversal detected in object key: {key}"),
            }
        }
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(TMP_DIR).join(format!("tmp-{}", id))
    }

    /// Recursively collect every object key under `dir`, relative to
    /// `bucket_root`, using '/' as the separator.
    fn collect_keys(
        bucket_root: &Path,
        dir: &Path,
        out: &mut Vec<(String, std::fs::Metadata)>,
    ) -> anyhow::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                Self::collect_keys(bucket_root, &path, out)?;
            } else if meta.is_file() {
                let rel = path.strip_prefix(bucket_root)?;
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((key, meta));
            }
        }
        Ok(())
    }

    fn modified(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
        meta.modified().ok().map(DateTime::<Utc>::from)
    }
}

impl ObjectStoreClient for LocalObjectStore {
    fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &PutSource,
        _headers: &PutHeaders,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<PutAck>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let source = source.clone();
        Box::pin(async move {
            let bucket_dir = self.bucket_dir(&bucket)?;
            if !bucket_dir.is_dir() {
                anyhow::bail!("The specified bucket does not exist: {bucket}");
            }
            let final_path = self.resolve(&bucket, &key)?;

            // Ensure parent directory exists (handles keys with '/' separators).
            if let Some(parent) = final_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let tmp_path = self.temp_path();
            let mut reader = source.open_range()?;
            let mut file = std::fs::File::create(&tmp_path)?;
            let mut hasher = Md5::new();
            let mut buf = vec![0u8; 64 * 1024];
            let mut written = 0u64;
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                file.write_all(&buf[..n])?;
                written += n as u64;
            }

            if written != source.length {
                drop(file);
                let _ = std::fs::remove_file(&tmp_path);
                anyhow::bail!(
                    "short read from {}: wanted {} bytes at offset {}, got {}",
                    source.path.display(),
                    source.length,
                    source.offset,
                    written
                );
            }

            file.sync_all()?; // fsync
            drop(file);
            std::fs::rename(&tmp_path, &final_path)?;

            debug!("local put: {} ({} bytes)", final_path.display(), written);

            Ok(PutAck {
                etag: format!("\"{}\"", hex::encode(hasher.finalize())),
            })
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
            let path = self.resolve(&bucket, &key)?;
            if !path.is_file() {
                anyhow::bail!("The specified key does not exist: {bucket}/{key}");
            }

            let file = tokio::fs::File::open(&path).await?;
            let meta = file.metadata().await?;

            Ok(FetchedObject {
                body: Box::pin(file),
                metadata: ObjectMetadata {
                    content_length: Some(meta.len()),
                    content_type: None,
                    last_modified: Self::modified(&meta),
                },
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
            let bucket_dir = self.bucket_dir(&bucket)?;
            if !bucket_dir.is_dir() {
                anyhow::bail!("The specified bucket does not exist: {bucket}");
            }

            let mut all = Vec::new();
            Self::collect_keys(&bucket_dir, &bucket_dir, &mut all)?;
            all.retain(|(k, _)| k.starts_with(&prefix) && k.as_str() > marker.as_str());
            all.sort_by(|a, b| a.0.cmp(&b.0));

            let is_truncated = all.len() > max_keys as usize;
            let entries = all
                .into_iter()
                .take(max_keys as usize)
                .map(|(key, meta)| ListEntry {
                    key,
                    size: meta.len(),
                    last_modified: Self::modified(&meta),
                    etag: None,
                })
                .collect();

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
            let mut buckets = Vec::new();
            for entry in std::fs::read_dir(&self.root)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == TMP_DIR || !entry.file_type()?.is_dir() {
                    continue;
                }
                let meta = entry.metadata()?;
                buckets.push(BucketEntry {
                    name,
                    created: meta.created().ok().map(DateTime::<Utc>::from),
                });
            }
            buckets.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(buckets)
        })
    }
}

// -- Tests -------------------------------------------------------------------
