//! Command-level operations: upload, download and listing.
//!
//! Each operation takes the store client and the transfer settings
//! explicitly and reports failures as [`TransferError`] values.

pub mod download;
pub mod list;
pub mod upload;

pub use download::{download, DownloadRequest, DownloadedFile};
pub use list::{format_entry, list, list_buckets};
pub use upload::{
    resolve_local_files, upload, FileOutcome, SkipReason, UploadRequest, UploadStatus,
};

use crate::errors::TransferError;

/// Split `bucket[/prefix]` at the first slash.  The prefix may be empty.
pub fn parse_put_target(target: &str) -> Result<(String, String), TransferError> {
    let (bucket, prefix) = match target.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (target, ""),
    };
    if bucket.is_empty() {
        return Err(TransferError::invalid(format!(
            "missing bucket name in '{target}'"
        )));
    }
    Ok((bucket.to_string(), prefix.to_string()))
}

/// Split `bucket/key` at the first slash.  Both parts are required.
pub fn parse_get_resource(resource: &str) -> Result<(String, String), TransferError> {
    match resource.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(TransferError::invalid(format!(
            "expected <bucket>/<key>, got '{resource}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put_target() {
        assert_eq!(
            parse_put_target("photos").unwrap(),
            ("photos".to_string(), String::new())
        );
        assert_eq!(
            parse_put_target("photos/2024/").unwrap(),
            ("photos".to_string(), "2024/".to_string())
        );
        assert!(parse_put_target("/prefix").is_err());
    }

    #[test]
    fn test_parse_get_resource() {
        assert_eq!(
            parse_get_resource("bucket/dir/file.tar").unwrap(),
            ("bucket".to_string(), "dir/file.tar".to_string())
        );
        let err = parse_get_resource("bucket").unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
        assert!(parse_get_resource("bucket/").is_err());
    }
}
