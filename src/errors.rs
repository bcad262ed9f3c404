//! Transfer error types.
//!
//! Every variant maps to a short error code and a process exit status so
//! the CLI can report failures the same way for every command.  Store
//! failures are carried unmodified in [`TransferError::Transport`].

use thiserror::Error;

/// Errors produced by the upload, download and listing operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The command line or an operation argument was malformed.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// No local file or remote object matched.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// A chunk was missing, duplicated or out of order during assembly.
    #[error("missing or out-of-order chunk: expected {expected}")]
    SequenceGap { expected: u32 },

    /// A single-part upload exceeds the store's maximum object size.
    #[error("{key} is too big ({size} bytes); maximum object size is {max} bytes, use chunked upload")]
    SizeLimit { key: String, size: u64, max: u64 },

    /// The chunk plan for a file needs more sequence numbers than the
    /// three-digit suffix can order.
    #[error("{key} needs {chunks} chunks; at most {max} are supported, use a larger chunk size")]
    TooManyChunks { key: String, chunks: u64, max: u64 },

    /// Local file system failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure reported by the object store client.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl TransferError {
    /// Shorthand for [`TransferError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        TransferError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Shorthand for [`TransferError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        TransferError::NotFound { what: what.into() }
    }

    /// Return the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidArgument { .. } => "InvalidArgument",
            TransferError::NotFound { .. } => "NotFound",
            TransferError::SequenceGap { .. } => "SequenceGap",
            TransferError::SizeLimit { .. } => "SizeLimit",
            TransferError::TooManyChunks { .. } => "TooManyChunks",
            TransferError::Io(_) => "Io",
            TransferError::Transport(_) => "Transport",
        }
    }

    /// Return the process exit status for this error.
    ///
    /// 1 = store failure, 2 = something was not found, 3 = anything else.
    pub fn exit_status(&self) -> u8 {
        match self {
            TransferError::Transport(_) => 1,
            TransferError::NotFound { .. } | TransferError::SequenceGap { .. } => 2,
            TransferError::InvalidArgument { .. }
            | TransferError::SizeLimit { .. }
            | TransferError::TooManyChunks { .. }
            | TransferError::Io(_) => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_gap_message() {
        let err = TransferError::SequenceGap { expected: 1 };
        assert_eq!(err.to_string(), "missing or out-of-order chunk: expected 1");
        assert_eq!(err.code(), "SequenceGap");
        assert_eq!(err.exit_status(), 2);
    }

    #[test]
    fn test_not_found_message() {
        let err = TransferError::not_found("pic*.jpg");
        assert_eq!(err.to_string(), "Not found: pic*.jpg");
        assert_eq!(err.exit_status(), 2);
    }

    #[test]
    fn test_transport_is_transparent() {
        let err: TransferError = anyhow::anyhow!("AWS S3 get_object: timed out").into();
        assert_eq!(err.to_string(), "AWS S3 get_object: timed out");
        assert_eq!(err.code(), "Transport");
        assert_eq!(err.exit_status(), 1);
    }

    #[test]
    fn test_io_from() {
        let err: TransferError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.code(), "Io");
        assert_eq!(err.exit_status(), 3);
    }

    #[test]
    fn test_size_errors_exit_status() {
        let size = TransferError::SizeLimit {
            key: "big.iso".to_string(),
            size: 10,
            max: 5,
        };
        let chunks = TransferError::TooManyChunks {
            key: "big.iso".to_string(),
            chunks: 1001,
            max: 1000,
        };
        assert_eq!(size.exit_status(), 3);
        assert_eq!(chunks.exit_status(), 3);
        assert!(chunks.to_string().contains("1001"));
    }
}
