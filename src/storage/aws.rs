//! AWS S3 object store client.
//!
//! Talks to a real S3 bucket (or any S3-compatible endpoint such as MinIO
//! or LocalStack).  Listings use the marker-based `ListObjects` call so
//! that the marker is always the last key seen.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless the
//! configuration supplies them explicitly.

use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::{
    BucketEntry, FetchedObject, ListEntry, ListPage, ObjectMetadata, ObjectStoreClient, PutAck,
    PutHeaders, PutSource,
};
use crate::config::AwsStorageConfig;

/// Object store client backed by the AWS SDK.
pub struct AwsObjectStore {
    /// AWS S3 SDK client.
    client: Client,
}

impl AwsObjectStore {
    /// Create a new S3 client from configuration.
    pub async fn new(config: &AwsStorageConfig) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        if !config.profile.is_empty() {
            config_loader = config_loader.profile_name(&config.profile);
        }

        // If explicit credentials are provided, inject them as static credentials.
        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "s3chunk-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "S3 client initialized: region={} endpoint='{}'",
            config.region, config.endpoint_url
        );

        Ok(Self { client })
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("AWS S3 {context}: {err}")
    }

    /// Convert an SDK timestamp to UTC.
    fn to_utc(t: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(t.secs(), t.subsec_nanos())
    }
}

impl ObjectStoreClient for AwsObjectStore {
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
        let headers = headers.clone();
        Box::pin(async move {
            debug!(
                "AWS put_object: bucket={} key={} offset={} length={}",
                bucket, key, source.offset, source.length
            );

            // Streams the range from disk; the chunk is never buffered whole.
            let body = ByteStream::read_from()
                .path(&source.path)
                .offset(source.offset)
                .length(Length::Exact(source.length))
                .build()
                .await
                .map_err(|e| Self::map_sdk_error("put_object body", e))?;

            let resp = self
                .client
                .put_object()
                .bucket(&bucket)
                .key(&key)
                .content_length(source.length as i64)
                .set_content_type(headers.content_type)
                .set_acl(headers.acl.as_deref().map(ObjectCannedAcl::from))
                .body(body)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("put_object", e.into_service_error()))?;

            Ok(PutAck {
                etag: resp.e_tag().unwrap_or("").to_string(),
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
            debug!("AWS get_object: bucket={} key={}", bucket, key);

            let resp = self
                .client
                .get_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        anyhow::anyhow!("The specified key does not exist: {bucket}/{key}")
                    } else {
                        Self::map_sdk_error("get_object", service_err)
                    }
                })?;

            let metadata = ObjectMetadata {
                content_length: resp.content_length().map(|n| n as u64),
                content_type: resp.content_type().map(|s| s.to_string()),
                last_modified: resp.last_modified().and_then(Self::to_utc),
            };

            Ok(FetchedObject {
                body: Box::pin(resp.body.into_async_read()),
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
            debug!(
                "AWS list_objects: bucket={} prefix='{}' marker='{}' max_keys={}",
                bucket, prefix, marker, max_keys
            );

            let mut req = self
                .client
                .list_objects()
                .bucket(&bucket)
                .max_keys(max_keys.min(i32::MAX as u32) as i32);

            if !prefix.is_empty() {
                req = req.prefix(&prefix);
            }
            if !marker.is_empty() {
                req = req.marker(&marker);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_objects", e.into_service_error()))?;

            let entries = resp
                .contents()
                .iter()
                .filter_map(|obj| {
                    obj.key().map(|k| ListEntry {
                        key: k.to_string(),
                        size: obj.size().unwrap_or(0).max(0) as u64,
                        last_modified: obj.last_modified().and_then(Self::to_utc),
                        etag: obj.e_tag().map(|s| s.to_string()),
                    })
                })
                .collect();

            Ok(ListPage {
                entries,
                is_truncated: resp.is_truncated() == Some(true),
            })
        })
    }

    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<BucketEntry>>> + Send + '_>> {
        Box::pin(async move {
            debug!("AWS list_buckets");

            let resp = self
                .client
                .list_buckets()
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_buckets", e.into_service_error()))?;

            Ok(resp
                .buckets()
                .iter()
                .filter_map(|b| {
                    b.name().map(|name| BucketEntry {
                        name: name.to_string(),
                        created: b.creation_date().and_then(Self::to_utc),
                    })
                })
                .collect())
        })
    }
}

// -- Tests -------------------------------------------------------------------
