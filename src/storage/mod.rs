//! Object store clients.
//!
//! The [`backend::ObjectStoreClient`] trait abstracts over where objects
//! physically live.  Implementations include AWS S3 (and S3-compatible
//! endpoints), a local directory tree, and an in-process memory store.

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;

use std::sync::Arc;
use tracing::info;

use crate::config::StorageConfig;
use backend::ObjectStoreClient;

/// Build the object store client selected by `config.backend`.
pub async fn connect(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStoreClient>> {
    let client: Arc<dyn ObjectStoreClient> = match config.backend.as_str() {
        "aws" => Arc::new(aws::AwsObjectStore::new(&config.aws).await?),
        "local" => {
            let root = &config.local.root_dir;
            let store = local::LocalObjectStore::new(root)?;
            info!("Local object store initialized at {}", root);
            Arc::new(store)
        }
        other => anyhow::bail!("unknown storage.backend '{other}' (expected 'aws' or 'local')"),
    };
    Ok(client)
}
