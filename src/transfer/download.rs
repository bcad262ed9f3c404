//! `get`: download one object, a wildcard set of objects, or a chunked
//! object reassembled into a single file.

use std::path::PathBuf;
use tokio::fs::File;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::chunk::assemble::{select_chunk_keys, ChunkAssembler};
use crate::config::TransferConfig;
use crate::errors::TransferError;
use crate::storage::backend::ObjectStoreClient;

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub bucket: String,
    /// Object key, base key of a chunked object, or a prefix ending in `*`.
    pub key: String,
    /// Explicit output file.  Defaults to the last `/` segment of the key
    /// inside `output_dir`.
    pub destination: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Reassemble `key.000`, `key.001`, ... into one file.
    pub chunked: bool,
}

/// One local file written by a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    /// Keys read into the file, in order.
    pub keys: Vec<String>,
    pub bytes: u64,
}

/// Run a download.
///
/// A failed chunked download leaves the partially written file in place.
pub async fn download(
    client: &dyn ObjectStoreClient,
    settings: &TransferConfig,
    request: &DownloadRequest,
) -> Result<Vec<DownloadedFile>, TransferError> {
    let wildcard = request.key.strip_suffix('*');

    if request.chunked {
        if wildcard.is_some() {
            return Err(TransferError::invalid(
                "wildcards cannot be combined with chunked download",
            ));
        }
        let file = download_chunked(client, settings, request).await?;
        return Ok(vec![file]);
    }

    let keys = match wildcard {
        Some(prefix) => {
            let mut keys = Catalog::new(client, &request.bucket, prefix, settings.page_size)
                .keys()
                .await?;
            keys.sort();
            keys
        }
        None => vec![request.key.clone()],
    };

    if keys.is_empty() {
        return Err(TransferError::not_found(&request.key));
    }
    if keys.len() > 1 && request.destination.is_some() {
        return Err(TransferError::invalid(format!(
            "{} matches {} objects; an explicit file name needs exactly one",
            request.key,
            keys.len()
        )));
    }

    let mut files = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(path) = output_path(request, &key) else {
            warn!("Skipping {}: key has no file name", key);
            continue;
        };
        // Open the local file only after the store has answered, so a
        // failed fetch leaves an existing file untouched.
        let object = client.get(&request.bucket, &key).await?;
        let mut sink = File::create(&path).await?;
        let report = ChunkAssembler::new(client, &request.bucket)
            .write_whole(&key, object, &mut sink)
            .await?;
        files.push(DownloadedFile {
            path,
            keys: report.keys,
            bytes: report.bytes,
        });
    }
    Ok(files)
}

async fn download_chunked(
    client: &dyn ObjectStoreClient,
    settings: &TransferConfig,
    request: &DownloadRequest,
) -> Result<DownloadedFile, TransferError> {
    let base = request.key.as_str();
    let listed = Catalog::new(
        client,
        &request.bucket,
        format!("{base}."),
        settings.page_size,
    )
    .keys()
    .await?;
    let candidates = select_chunk_keys(base, listed);
    if candidates.is_empty() {
        return Err(TransferError::not_found(base));
    }
    debug!("{} chunks found for {}", candidates.len(), base);

    let path = output_path(request, base)
        .ok_or_else(|| TransferError::invalid(format!("no file name in key '{base}'")))?;
    let mut sink = File::create(&path).await?;
    let report = ChunkAssembler::new(client, &request.bucket)
        .assemble(base, &candidates, &mut sink)
        .await?;

    Ok(DownloadedFile {
        path,
        keys: report.keys,
        bytes: report.bytes,
    })
}

fn output_path(request: &DownloadRequest, key: &str) -> Option<PathBuf> {
    if let Some(dest) = &request.destination {
        return Some(dest.clone());
    }
    let name = key.rsplit('/').next().unwrap_or(key);
    if name.is_empty() {
        return None;
    }
    Some(request.output_dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryObjectStore;
    use std::fs;

    fn request(dir: &tempfile::TempDir, key: &str, chunked: bool) -> DownloadRequest {
        DownloadRequest {
            bucket: "bucket".to_string(),
            key: key.to_string(),
            destination: None,
            output_dir: dir.path().to_path_buf(),
            chunked,
        }
    }

    #[tokio::test]
    async fn test_single_object_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "docs/readme.txt", "hello").await;

        let files = download(
            &store,
            &TransferConfig::default(),
            &request(&dir, "docs/readme.txt", false),
        )
        .await
        .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, dir.path().join("readme.txt"));
        assert_eq!(fs::read(&files[0].path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_failed_get_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("readme.txt");
        fs::write(&local, b"local copy").unwrap();

        let store = MemoryObjectStore::new();
        store.create_bucket("bucket").await;
        let err = download(
            &store,
            &TransferConfig::default(),
            &request(&dir, "docs/readme.txt", false),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), "Transport");
        assert_eq!(fs::read(&local).unwrap(), b"local copy");
    }

    #[tokio::test]
    async fn test_wildcard_downloads_each_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "pics/b.jpg", "B").await;
        store.put_bytes("bucket", "pics/a.jpg", "A").await;
        store.put_bytes("bucket", "docs/c.txt", "C").await;

        let settings = TransferConfig {
            page_size: 1,
            ..TransferConfig::default()
        };
        let files = download(&store, &settings, &request(&dir, "pics/*", false))
            .await
            .unwrap();

        let names: Vec<_> = files.iter().map(|f| f.keys[0].as_str()).collect();
        assert_eq!(names, vec!["pics/a.jpg", "pics/b.jpg"]);
        assert_eq!(fs::read(dir.path().join("b.jpg")).unwrap(), b"B");
        assert!(!dir.path().join("c.txt").exists());
    }

    #[tokio::test]
    async fn test_wildcard_with_destination_needs_single_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "pics/a.jpg", "A").await;
        store.put_bytes("bucket", "pics/b.jpg", "B").await;

        let mut req = request(&dir, "pics/*", false);
        req.destination = Some(dir.path().join("out.jpg"));
        let err = download(&store, &TransferConfig::default(), &req)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");

        req.key = "pics/a*".to_string();
        let files = download(&store, &TransferConfig::default(), &req)
            .await
            .unwrap();
        assert_eq!(fs::read(&files[0].path).unwrap(), b"A");
    }

    #[tokio::test]
    async fn test_wildcard_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.create_bucket("bucket").await;
        let err = download(&store, &TransferConfig::default(), &request(&dir, "none*", false))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NotFound");
    }

    #[tokio::test]
    async fn test_chunked_reassembly_ignores_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "vm/disk.img.000", "aa").await;
        store.put_bytes("bucket", "vm/disk.img.001", "bb").await;
        store.put_bytes("bucket", "vm/disk.img.002", "c").await;
        store.put_bytes("bucket", "vm/disk.img.md5", "x").await;
        store.put_bytes("bucket", "vm/disk.img.000.bak", "x").await;

        let files = download(
            &store,
            &TransferConfig::default(),
            &request(&dir, "vm/disk.img", true),
        )
        .await
        .unwrap();

        assert_eq!(files[0].bytes, 5);
        assert_eq!(fs::read(dir.path().join("disk.img")).unwrap(), b"aabbc");
    }

    #[tokio::test]
    async fn test_chunked_gap_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "f.000", "first").await;
        store.put_bytes("bucket", "f.002", "third").await;

        let mut req = request(&dir, "f", true);
        req.destination = Some(dir.path().join("restored"));
        let err = download(&store, &TransferConfig::default(), &req)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::SequenceGap { expected: 1 }));
        assert_eq!(fs::read(dir.path().join("restored")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_chunked_rejects_wildcard_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "other", "x").await;

        let err = download(&store, &TransferConfig::default(), &request(&dir, "f*", true))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");

        let err = download(&store, &TransferConfig::default(), &request(&dir, "f", true))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NotFound");
        assert!(!dir.path().join("f").exists());
    }
}
