// ABOUTME: Object-storage staging for the extracted snapshot
// ABOUTME: Thin S3 put/get wrapper with custom-endpoint support for S3 compatibles

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::config::StorageConfig;
use crate::error::{Result, SyncError};

/// Staging area for the snapshot CSV in S3 (or an S3-compatible service).
///
/// Credentials resolve through the AWS default chain (environment,
/// profile, instance role); they are never read from the pipeline config.
pub struct SnapshotStore {
    client: S3Client,
    bucket: String,
    key: String,
}

impl SnapshotStore {
    /// Build a store from the storage configuration.
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.endpoint_url.is_some() {
            // MinIO and LocalStack do not resolve virtual-hosted buckets
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            key: config.key.clone(),
        })
    }

    /// Upload the staged snapshot, replacing any previous object.
    pub async fn put(&self, bytes: Vec<u8>) -> Result<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type("text/csv")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                SyncError::Extract(format!(
                    "Failed to upload s3://{}/{}: {}",
                    self.bucket,
                    self.key,
                    DisplayErrorContext(&e)
                ))
            })?;

        tracing::info!(
            "Staged snapshot to s3://{}/{} ({} bytes)",
            self.bucket,
            self.key,
            size
        );
        Ok(())
    }

    /// Download the staged snapshot.
    pub async fn get(&self) -> Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .map_err(|e| {
                SyncError::Extract(format!(
                    "Failed to fetch s3://{}/{}: {}",
                    self.bucket,
                    self.key,
                    DisplayErrorContext(&e)
                ))
            })?;

        let bytes = object.body.collect().await.map_err(|e| {
            SyncError::Extract(format!(
                "Failed to read s3://{}/{} body: {}",
                self.bucket, self.key, e
            ))
        })?;

        Ok(bytes.into_bytes().to_vec())
    }
}
