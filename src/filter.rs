//! Pre-upload inclusion policies.
//!
//! [`NewOnlyFilter`] drops keys that already exist remotely (exact match,
//! so `file` and `file.000` are never confused).  [`BackupFilter`] keeps
//! only files whose archive indicator is set; the upload loop clears the
//! indicator once the file is safely stored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

use crate::catalog::Catalog;
use crate::errors::TransferError;
use crate::storage::backend::ObjectStoreClient;

// -- New-only ----------------------------------------------------------------

/// Exact-match membership set of the keys already stored under a prefix.
#[derive(Debug, Default, Clone)]
pub struct NewOnlyFilter {
    existing: HashSet<String>,
}

impl NewOnlyFilter {
    /// Drain the whole listing of `bucket`/`prefix` before returning.
    pub async fn load(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        prefix: &str,
        page_size: u32,
    ) -> Result<Self, TransferError> {
        let mut catalog = Catalog::new(client, bucket, prefix, page_size);
        let mut existing = HashSet::new();
        while let Some(entry) = catalog.next().await? {
            existing.insert(entry.key);
        }
        debug!(
            "{} keys already present under {}/{} ({} pages)",
            existing.len(),
            bucket,
            prefix,
            catalog.pages_fetched()
        );
        Ok(Self { existing })
    }

    /// Whether `key` is already stored.
    pub fn contains(&self, key: &str) -> bool {
        self.existing.contains(key)
    }

    pub fn is_new(&self, key: &str) -> bool {
        !self.contains(key)
    }
}

// -- Backup ------------------------------------------------------------------

/// Per-file "needs backup" flag maintained outside the upload core.
pub trait ArchiveIndicator {
    /// Whether `path` has changed since it was last backed up.
    fn is_set(&self, path: &Path) -> anyhow::Result<bool>;

    /// Record that `path` has just been backed up.
    fn clear(&mut self, path: &Path) -> anyhow::Result<()>;
}

/// Inclusion policy for `put --backup`.
pub struct BackupFilter<'a> {
    indicator: &'a dyn ArchiveIndicator,
}

impl<'a> BackupFilter<'a> {
    pub fn new(indicator: &'a dyn ArchiveIndicator) -> Self {
        Self { indicator }
    }

    /// Include the file when its indicator is set.
    pub fn include(&self, path: &Path) -> Result<bool, TransferError> {
        self.indicator
            .is_set(path)
            .map_err(|e| TransferError::Io(std::io::Error::other(e)))
    }
}

/// What a file looked like when it was last backed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerEntry {
    size: u64,
    modified_ns: u64,
}

impl LedgerEntry {
    fn of(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        let modified_ns = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Ok(Self {
            size: meta.len(),
            modified_ns,
        })
    }
}

/// [`ArchiveIndicator`] backed by a JSON file of file sizes and
/// modification times.
///
/// A file's indicator is set when the ledger has no entry for it or the
/// recorded size or mtime differ from the file on disk.  Every `clear`
/// rewrites the ledger through a temp file and rename, so an interrupted
/// run leaves either the old or the new ledger.
#[derive(Debug)]
pub struct ArchiveLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl ArchiveLedger {
    /// Load the ledger at `path`.  A missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    /// Number of files recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_key(path: &Path) -> String {
        let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        absolute.to_string_lossy().into_owned()
    }

    fn save(&self) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(&self.entries)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(".ledger-{}.tmp", uuid::Uuid::new_v4()));
        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp, &self.path)
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl ArchiveIndicator for ArchiveLedger {
    fn is_set(&self, path: &Path) -> anyhow::Result<bool> {
        let current = LedgerEntry::of(path)?;
        Ok(self.entries.get(&Self::entry_key(path)) != Some(&current))
    }

    fn clear(&mut self, path: &Path) -> anyhow::Result<()> {
        let current = LedgerEntry::of(path)?;
        self.entries.insert(Self::entry_key(path), current);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryObjectStore;

    #[tokio::test]
    async fn test_new_only_exact_match() {
        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "a/x", "1").await;
        store.put_bytes("bucket", "a/y", "2").await;
        store.put_bytes("bucket", "b/z", "3").await;

        let filter = NewOnlyFilter::load(&store, "bucket", "a/", 1).await.unwrap();
        assert!(filter.contains("a/x"));
        assert!(filter.contains("a/y"));
        assert!(!filter.contains("b/z"));

        let result: Vec<_> = ["a/x", "a/z"]
            .into_iter()
            .filter(|k| filter.is_new(k))
            .collect();
        assert_eq!(result, vec!["a/z"]);
    }

    #[tokio::test]
    async fn test_new_only_does_not_prefix_match() {
        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "data/file", "plain").await;
        let filter = NewOnlyFilter::load(&store, "bucket", "data/", 10).await.unwrap();
        assert!(filter.contains("data/file"));
        assert!(filter.is_new("data/file.000"));

        let store = MemoryObjectStore::new();
        store.put_bytes("bucket", "data/file.000", "chunk").await;
        let filter = NewOnlyFilter::load(&store, "bucket", "data/", 10).await.unwrap();
        assert!(filter.is_new("data/file"));
    }

    #[tokio::test]
    async fn test_new_only_listing_failure() {
        let store = MemoryObjectStore::new();
        let err = NewOnlyFilter::load(&store, "missing", "", 10)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Transport");
    }

    #[test]
    fn test_ledger_set_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.txt");
        fs::write(&file, b"v1").unwrap();

        let ledger_path = dir.path().join("ledger.json");
        let mut ledger = ArchiveLedger::load(&ledger_path).unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.is_set(&file).unwrap());

        ledger.clear(&file).unwrap();
        assert!(!ledger.is_set(&file).unwrap());
        assert!(ledger_path.exists());

        // Persisted across loads.
        let reloaded = ArchiveLedger::load(&ledger_path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(!reloaded.is_set(&file).unwrap());
    }

    #[test]
    fn test_ledger_detects_size_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        fs::write(&file, b"abc").unwrap();

        let mut ledger = ArchiveLedger::load(dir.path().join("ledger.json")).unwrap();
        ledger.clear(&file).unwrap();

        fs::write(&file, b"abcdef").unwrap();
        assert!(ledger.is_set(&file).unwrap());
    }

    #[test]
    fn test_ledger_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, b"x").unwrap();

        let mut ledger = ArchiveLedger::load(dir.path().join("ledger.json")).unwrap();
        ledger.clear(&file).unwrap();
        ledger.clear(&file).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
    }

    #[test]
    fn test_backup_filter_uses_indicator() {
        struct Flagged(HashSet<PathBuf>);
        impl ArchiveIndicator for Flagged {
            fn is_set(&self, path: &Path) -> anyhow::Result<bool> {
                Ok(self.0.contains(path))
            }
            fn clear(&mut self, path: &Path) -> anyhow::Result<()> {
                self.0.remove(path);
                Ok(())
            }
        }

        let indicator = Flagged([PathBuf::from("changed")].into_iter().collect());
        let filter = BackupFilter::new(&indicator);
        assert!(filter.include(Path::new("changed")).unwrap());
        assert!(!filter.include(Path::new("unchanged")).unwrap());
    }

    #[test]
    fn test_corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"not json").unwrap();
        assert!(ArchiveLedger::load(&path).is_err());
    }
}
