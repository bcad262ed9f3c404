//! s3chunk library: object store transfers with client-side chunking.
//!
//! Files larger than the store's per-object limit are split into
//! fixed-size chunks stored as `key.000`, `key.001`, ... and reassembled
//! in numeric order on download.  Listings are paginated lazily through
//! [`catalog::Catalog`]; uploads can be restricted to new keys or to files
//! changed since their last backup.

pub mod catalog;
pub mod chunk;
pub mod config;
pub mod errors;
pub mod filter;
pub mod storage;
pub mod transfer;
