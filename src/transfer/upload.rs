//! `put`: upload local files, optionally in chunks.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::chunk::plan::{check_single_part, plan_file};
use crate::config::TransferConfig;
use crate::errors::TransferError;
use crate::filter::{ArchiveIndicator, BackupFilter, NewOnlyFilter};
use crate::storage::backend::{ObjectStoreClient, PutHeaders, PutSource};

/// Everything `put` needs to know about one batch.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bucket: String,
    /// Prepended to each file name to form its key.
    pub base_key: String,
    pub files: Vec<PathBuf>,
    /// Split each file into chunks of this size.  `None` uploads each file
    /// as a single object.
    pub chunk_size: Option<NonZeroU64>,
    /// Only upload files whose archive indicator is set.
    pub backup_only: bool,
    /// Skip keys that already exist in the bucket.
    pub new_only: bool,
    /// Canned ACL applied to every object written.
    pub acl: Option<String>,
}

/// Why a file was not uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Backup mode and the file has not changed since its last backup.
    Unchanged,
    /// New-only mode and every key for the file is already stored.
    AlreadyPresent,
    /// Larger than the store's single-object limit and not chunked.
    TooLarge,
}

/// Result for one file of the batch.
#[derive(Debug)]
pub enum UploadStatus {
    Uploaded { keys: Vec<String>, bytes: u64 },
    Skipped { reason: SkipReason },
    /// Only produced when `transfer.continue_on_error` is set.
    Failed { error: TransferError },
}

/// Outcome of uploading `path` to `key`.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub key: String,
    pub status: UploadStatus,
}

/// Expand a `dir/name-glob` pattern into the matching regular files,
/// sorted by path.  Only the file name part may contain wildcards.
pub fn resolve_local_files(pattern: &str) -> Result<Vec<PathBuf>, TransferError> {
    let path = Path::new(pattern);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::invalid(format!("no file name in '{pattern}'")))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let matcher = glob::Pattern::new(name)
        .map_err(|e| TransferError::invalid(format!("invalid file pattern '{name}': {e}")))?;

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::not_found(pattern))
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        if let Some(file_name) = file_name.to_str() {
            if matcher.matches(file_name) {
                files.push(entry.path());
            }
        }
    }

    if files.is_empty() {
        return Err(TransferError::not_found(pattern));
    }
    files.sort();
    Ok(files)
}

/// Upload every file of `request`, one object at a time.
///
/// Files over the size limit are skipped with a warning.  Any other
/// failure aborts the batch unless `settings.continue_on_error` is set, in
/// which case it is recorded as [`UploadStatus::Failed`] and the next file
/// is tried.  In backup mode `indicator` must be provided; it is cleared
/// for each file that was uploaded.
pub async fn upload(
    client: &dyn ObjectStoreClient,
    settings: &TransferConfig,
    request: &UploadRequest,
    mut indicator: Option<&mut dyn ArchiveIndicator>,
) -> Result<Vec<FileOutcome>, TransferError> {
    if request.backup_only && indicator.is_none() {
        return Err(TransferError::invalid(
            "backup mode needs an archive indicator",
        ));
    }

    let existing = if request.new_only {
        Some(
            NewOnlyFilter::load(
                client,
                &request.bucket,
                &request.base_key,
                settings.page_size,
            )
            .await?,
        )
    } else {
        None
    };

    let headers = PutHeaders {
        content_type: None,
        acl: request.acl.clone(),
    };

    let mut outcomes = Vec::with_capacity(request.files.len());
    for path in &request.files {
        let key = object_key(&request.base_key, path)?;

        let result = match include_for_backup(request, indicator.as_deref(), path) {
            Ok(false) => {
                debug!("{} unchanged since last backup", path.display());
                Ok(UploadStatus::Skipped {
                    reason: SkipReason::Unchanged,
                })
            }
            Ok(true) => {
                upload_file(
                    client,
                    settings,
                    request,
                    &headers,
                    existing.as_ref(),
                    path,
                    &key,
                )
                .await
            }
            Err(e) => Err(e),
        };

        // The indicator is cleared only once every object of the file is
        // stored; if clearing fails the file is reported as failed.
        let result = match result {
            Ok(status @ UploadStatus::Uploaded { .. }) if request.backup_only => {
                clear_indicator(indicator.as_deref_mut(), path).map(|()| status)
            }
            other => other,
        };

        let status = match result {
            Ok(status) => status,
            Err(e) if settings.continue_on_error => {
                warn!("Upload of {} failed: {}", path.display(), e);
                UploadStatus::Failed { error: e }
            }
            Err(e) => return Err(e),
        };

        outcomes.push(FileOutcome {
            path: path.clone(),
            key,
            status,
        });
    }

    Ok(outcomes)
}

fn include_for_backup(
    request: &UploadRequest,
    indicator: Option<&dyn ArchiveIndicator>,
    path: &Path,
) -> Result<bool, TransferError> {
    match indicator {
        Some(ind) if request.backup_only => BackupFilter::new(ind).include(path),
        _ => Ok(true),
    }
}

fn clear_indicator<'a>(
    indicator: Option<&mut (dyn ArchiveIndicator + 'a)>,
    path: &Path,
) -> Result<(), TransferError> {
    match indicator {
        Some(ind) => ind
            .clear(path)
            .map_err(|e| TransferError::Io(std::io::Error::other(e))),
        None => Ok(()),
    }
}

fn object_key(base_key: &str, path: &Path) -> Result<String, TransferError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .ok_or_else(|| TransferError::invalid(format!("{} has no file name", path.display())))?;
    Ok(format!("{base_key}{name}"))
}

async fn upload_file(
    client: &dyn ObjectStoreClient,
    settings: &TransferConfig,
    request: &UploadRequest,
    headers: &PutHeaders,
    existing: Option<&NewOnlyFilter>,
    path: &Path,
    key: &str,
) -> Result<UploadStatus, TransferError> {
    let length = tokio::fs::metadata(path).await?.len();

    let pieces: Vec<(String, PutSource)> = match request.chunk_size {
        None => {
            if let Err(e) = check_single_part(key, length, settings.max_object_size) {
                warn!("{e}");
                return Ok(UploadStatus::Skipped {
                    reason: SkipReason::TooLarge,
                });
            }
            vec![(key.to_string(), PutSource::whole(path, length))]
        }
        Some(chunk_size) => plan_file(key, length, chunk_size)?
            .keyed(key)
            .map(|(chunk_key, chunk)| {
                let source = PutSource {
                    path: path.to_path_buf(),
                    offset: chunk.offset,
                    length: chunk.length,
                };
                (chunk_key, source)
            })
            .collect(),
    };

    let total = pieces.len();
    let pieces: Vec<_> = match existing {
        Some(filter) => pieces
            .into_iter()
            .filter(|(k, _)| filter.is_new(k))
            .collect(),
        None => pieces,
    };
    if pieces.is_empty() {
        debug!("{} already present", key);
        return Ok(UploadStatus::Skipped {
            reason: SkipReason::AlreadyPresent,
        });
    }
    if pieces.len() < total {
        info!(
            "Resuming {}: {} of {} chunks already present",
            key,
            total - pieces.len(),
            total
        );
    }

    let mut keys = Vec::with_capacity(pieces.len());
    let mut bytes = 0u64;
    for (object_key, source) in pieces {
        info!("Writing to key {}", object_key);
        client
            .put(&request.bucket, &object_key, &source, headers)
            .await?;
        bytes += source.length;
        keys.push(object_key);
    }

    Ok(UploadStatus::Uploaded { keys, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::assemble::{select_chunk_keys, ChunkAssembler};
    use crate::catalog::Catalog;
    use crate::filter::ArchiveLedger;
    use crate::storage::memory::MemoryObjectStore;
    use std::fs;

    fn nz(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    fn request(files: Vec<PathBuf>, chunk_size: Option<NonZeroU64>) -> UploadRequest {
        UploadRequest {
            bucket: "bucket".to_string(),
            base_key: "backups/".to_string(),
            files,
            chunk_size,
            backup_only: false,
            new_only: false,
            acl: None,
        }
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_round_trip_chunk_boundaries() {
        let c = 16u64;
        let dir = tempfile::tempdir().unwrap();
        let settings = TransferConfig::default();

        for len in [0, 1, c - 1, c, c + 1, 10 * c] {
            let store = MemoryObjectStore::new();
            store.create_bucket("bucket").await;

            let data = patterned(len as usize);
            let path = dir.path().join(format!("file-{len}.bin"));
            fs::write(&path, &data).unwrap();

            let outcomes = upload(&store, &settings, &request(vec![path], Some(nz(c))), None)
                .await
                .unwrap();
            let expected_chunks = len.div_ceil(c).max(1) as usize;
            match &outcomes[0].status {
                UploadStatus::Uploaded { keys, bytes } => {
                    assert_eq!(keys.len(), expected_chunks, "length {len}");
                    assert_eq!(*bytes, len);
                }
                other => panic!("unexpected status {other:?}"),
            }

            let base = format!("backups/file-{len}.bin");
            let listed = Catalog::new(&store, "bucket", format!("{base}."), 3)
                .keys()
                .await
                .unwrap();
            let keys = select_chunk_keys(&base, listed);

            let mut out = Vec::new();
            let mut assembler = ChunkAssembler::new(&store, "bucket");
            assembler.assemble(&base, &keys, &mut out).await.unwrap();
            assert_eq!(out, data, "round trip of {len} bytes");
        }
    }

    #[tokio::test]
    async fn test_single_part_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();

        let store = MemoryObjectStore::new();
        store.create_bucket("bucket").await;
        let outcomes = upload(
            &store,
            &TransferConfig::default(),
            &request(vec![path], None),
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcomes[0].key, "backups/notes.txt");
        assert!(matches!(
            &outcomes[0].status,
            UploadStatus::Uploaded { keys, bytes: 5 } if keys == &["backups/notes.txt"]
        ));
    }

    #[tokio::test]
    async fn test_too_large_is_skipped_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.bin");
        let small = dir.path().join("small.bin");
        fs::write(&big, vec![0u8; 20]).unwrap();
        fs::write(&small, vec![0u8; 5]).unwrap();

        let store = MemoryObjectStore::new();
        store.create_bucket("bucket").await;
        let settings = TransferConfig {
            max_object_size: 10,
            ..TransferConfig::default()
        };
        let outcomes = upload(&store, &settings, &request(vec![big, small], None), None)
            .await
            .unwrap();

        assert!(matches!(
            outcomes[0].status,
            UploadStatus::Skipped {
                reason: SkipReason::TooLarge
            }
        ));
        assert!(matches!(outcomes[1].status, UploadStatus::Uploaded { .. }));
        assert_eq!(store.object_count("bucket").await, 1);
    }

    #[tokio::test]
    async fn test_new_only_resumes_partial_chunked_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let data = patterned(50);
        fs::write(&path, &data).unwrap();

        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "backups/disk.img.000", data[..10].to_vec()).await;
        store.put_bytes("bucket", "backups/disk.img.001", data[10..20].to_vec()).await;

        let mut req = request(vec![path.clone()], Some(nz(10)));
        req.new_only = true;
        let outcomes = upload(&store, &TransferConfig::default(), &req, None)
            .await
            .unwrap();
        match &outcomes[0].status {
            UploadStatus::Uploaded { keys, bytes } => {
                assert_eq!(
                    keys,
                    &[
                        "backups/disk.img.002",
                        "backups/disk.img.003",
                        "backups/disk.img.004"
                    ]
                );
                assert_eq!(*bytes, 30);
            }
            other => panic!("unexpected status {other:?}"),
        }

        // A second run has nothing left to do.
        let outcomes = upload(&store, &TransferConfig::default(), &req, None)
            .await
            .unwrap();
        assert!(matches!(
            outcomes[0].status,
            UploadStatus::Skipped {
                reason: SkipReason::AlreadyPresent
            }
        ));
    }

    #[tokio::test]
    async fn test_new_only_plain_key_not_confused_with_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"abc").unwrap();

        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "backups/data.000", "abc").await;

        let mut req = request(vec![path], None);
        req.new_only = true;
        let outcomes = upload(&store, &TransferConfig::default(), &req, None)
            .await
            .unwrap();
        assert!(matches!(outcomes[0].status, UploadStatus::Uploaded { .. }));
    }

    #[tokio::test]
    async fn test_backup_mode_clears_indicator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger-me.txt");
        fs::write(&path, b"content").unwrap();

        let store = MemoryObjectStore::new();
        store.create_bucket("bucket").await;
        let mut ledger = ArchiveLedger::load(dir.path().join("ledger.json")).unwrap();

        let mut req = request(vec![path.clone()], None);
        req.backup_only = true;
        let settings = TransferConfig::default();

        let first = upload(&store, &settings, &req, Some(&mut ledger)).await.unwrap();
        assert!(matches!(first[0].status, UploadStatus::Uploaded { .. }));
        assert!(!ledger.is_set(&path).unwrap());

        let second = upload(&store, &settings, &req, Some(&mut ledger)).await.unwrap();
        assert!(matches!(
            second[0].status,
            UploadStatus::Skipped {
                reason: SkipReason::Unchanged
            }
        ));
        assert_eq!(store.object_count("bucket").await, 1);
    }

    #[tokio::test]
    async fn test_backup_indicator_error_follows_continue_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.txt");
        let ok = dir.path().join("ok.txt");
        fs::write(&ok, b"still here").unwrap();

        let store = MemoryObjectStore::new();
        store.create_bucket("bucket").await;
        let mut ledger = ArchiveLedger::load(dir.path().join("ledger.json")).unwrap();

        let mut req = request(vec![gone.clone(), ok.clone()], None);
        req.backup_only = true;

        let err = upload(&store, &TransferConfig::default(), &req, Some(&mut ledger))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Io");
        assert_eq!(store.object_count("bucket").await, 0);

        let settings = TransferConfig {
            continue_on_error: true,
            ..TransferConfig::default()
        };
        let outcomes = upload(&store, &settings, &req, Some(&mut ledger))
            .await
            .unwrap();
        assert!(matches!(outcomes[0].status, UploadStatus::Failed { .. }));
        assert!(matches!(outcomes[1].status, UploadStatus::Uploaded { .. }));
        assert_eq!(store.object_count("bucket").await, 1);
        assert!(!ledger.is_set(&ok).unwrap());
    }

    #[tokio::test]
    async fn test_backup_mode_requires_indicator() {
        let store = MemoryObjectStore::new();
        let mut req = request(Vec::new(), None);
        req.backup_only = true;
        let err = upload(&store, &TransferConfig::default(), &req, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
    }

    #[tokio::test]
    async fn test_failure_aborts_or_continues() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"1").unwrap();
        fs::write(&b, b"2").unwrap();

        // No bucket: every put fails.
        let store = MemoryObjectStore::new();
        let req = request(vec![a, b], None);

        let err = upload(&store, &TransferConfig::default(), &req, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Transport");

        let settings = TransferConfig {
            continue_on_error: true,
            ..TransferConfig::default()
        };
        let outcomes = upload(&store, &settings, &req, None).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.status, UploadStatus::Failed { .. })));
    }

    #[tokio::test]
    async fn test_too_many_chunks_fails_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("many");
        fs::write(&path, vec![1u8; 1001]).unwrap();

        let store = MemoryObjectStore::new();
        store.create_bucket("bucket").await;
        let err = upload(
            &store,
            &TransferConfig::default(),
            &request(vec![path], Some(nz(1))),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "TooManyChunks");
        assert_eq!(store.object_count("bucket").await, 0);
    }

    #[test]
    fn test_resolve_local_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["pic2.jpg", "pic1.jpg", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("pic3.jpg")).unwrap();

        let pattern = dir.path().join("pic*.jpg");
        let files = resolve_local_files(pattern.to_str().unwrap()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["pic1.jpg", "pic2.jpg"]);

        let missing = dir.path().join("*.png");
        let err = resolve_local_files(missing.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code(), "NotFound");
    }
}
