//! `list`: enumerate buckets, or the objects under a prefix.

use crate::catalog::Catalog;
use crate::errors::TransferError;
use crate::storage::backend::{BucketEntry, ListEntry, ObjectStoreClient};

const MIB: u64 = 1024 * 1024;

/// Lazily list `bucket` under `prefix`.  A trailing `*` on the prefix is
/// ignored, so `list bucket/pics*` and `list bucket/pics` are the same.
pub fn list<'a>(
    client: &'a dyn ObjectStoreClient,
    bucket: &str,
    prefix: &str,
    page_size: u32,
) -> Catalog<'a> {
    let prefix = prefix.strip_suffix('*').unwrap_or(prefix);
    Catalog::new(client, bucket, prefix, page_size)
}

/// All buckets visible to the configured credentials.
pub async fn list_buckets(
    client: &dyn ObjectStoreClient,
) -> Result<Vec<BucketEntry>, TransferError> {
    Ok(client.list_buckets().await?)
}

/// One `list` output line: `<last modified>\t<size>M\t<key>`.
///
/// The size is counted in whole MiB, rounded down, and printed with one
/// decimal place (`1.0M` for a 1.5 MiB object).
pub fn format_entry(entry: &ListEntry) -> String {
    let modified = entry
        .last_modified
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let megabytes = (entry.size / MIB) as f64;
    format!("{}\t{:.1}M\t{}", modified, megabytes, entry.key)
}
