// mongobackup/src/backup/s3_upload.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::Path;
use tracing::info;

use crate::config::S3Config;
use crate::errors::AppError;

/// Fixed key prefix for every uploaded archive.
pub const BACKUP_KEY_PREFIX: &str = "mongodb-backups";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Single-shot upload of a local file.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()>;
}

/// `mongodb-backups/<file name>`.
pub fn backup_key(file_path: &Path) -> Result<String> {
    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Archive path has no usable file name: {}", file_path.display()))?;
    Ok(format!("{}/{}", BACKUP_KEY_PREFIX, file_name))
}

/// Uploads the archive and returns its object key. No retries.
pub async fn upload_backup(store: &dyn ObjectStore, file_path: &Path) -> Result<String> {
    let key = backup_key(file_path)?;
    info!(key = %key, "Uploading backup to S3");
    store.put_file(&key, file_path, ARCHIVE_CONTENT_TYPE).await?;
    info!(key = %key, "✅ Upload to S3 completed successfully");
    Ok(key)
}

/// S3-compatible object storage (AWS, DigitalOcean Spaces, MinIO, R2).
pub struct S3Store {
    client: s3::Client,
    bucket_name: Option<String>,
}

impl S3Store {
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                key_id,
                secret,
                config.session_token.clone(),
                None, // expiry
                "Static",
            ));
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        S3Store {
            client: s3::Client::from_conf(s3_config),
            bucket_name: config.bucket_name.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let bucket = self.bucket_name.as_deref().ok_or_else(|| {
            AppError::Storage("S3_BUCKET (or AWS_BUCKET) environment variable is not set".into())
        })?;

        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "Failed to upload {} to bucket {} with key {}: {}",
                    path.display(),
                    bucket,
                    key,
                    s3::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
