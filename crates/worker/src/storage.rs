//! Object storage for finished latents.
//!
//! Production uses an S3-compatible bucket (Cloudflare R2). The
//! [`ObjectStore`] trait keeps the processor independent of the SDK.

use std::path::Path;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use crate::config::StorageConfig;
use crate::error::ProcessError;

/// Destination for uploaded latent containers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` under `key`, replacing any existing object.
    async fn upload_file(&self, path: &Path, key: &str) -> Result<(), ProcessError>;
}

/// [`ObjectStore`] backed by an S3-compatible bucket.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client with static credentials against `config.endpoint_url`.
    ///
    /// R2 ignores the region but the SDK requires one; `auto` is the
    /// documented placeholder.
    pub async fn connect(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "unfuzzed-worker",
        );

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("auto"))
            .endpoint_url(&config.endpoint_url)
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload_file(&self, path: &Path, key: &str) -> Result<(), ProcessError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| ProcessError::Upload(format!("Cannot read {}: {e}", path.display())))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| ProcessError::Upload(DisplayErrorContext(&e).to_string()))?;

        tracing::debug!(bucket = %self.bucket, key, "Object uploaded");
        Ok(())
    }
}
