// mongobackup/src/backup/logic.rs
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use super::retention::sweep_old_backups;
use super::s3_upload::{ObjectStore, upload_backup};
use super::{Exporter, archive_file_name};
use crate::config::{EnvLookup, MongoConfig, retention_days_from_lookup};

/// What one completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub archive_path: PathBuf,
    pub object_key: String,
    pub removed: Vec<PathBuf>,
}

/// Export → upload → sweep, strictly in that order. Any stage error aborts
/// the stages after it.
pub struct BackupPipeline {
    backup_dir: PathBuf,
    exporter: Arc<dyn Exporter>,
    store: Arc<dyn ObjectStore>,
    env: EnvLookup,
}

impl BackupPipeline {
    pub fn new(
        backup_dir: PathBuf,
        exporter: Arc<dyn Exporter>,
        store: Arc<dyn ObjectStore>,
        env: EnvLookup,
    ) -> Self {
        BackupPipeline { backup_dir, exporter, store, env }
    }

    pub async fn run(&self) -> Result<RunReport> {
        // Database settings are re-read every run, before any connection.
        let mongo = MongoConfig::from_lookup(&*self.env)?;

        fs::create_dir_all(&self.backup_dir).with_context(|| {
            format!("Failed to create backup directory: {}", self.backup_dir.display())
        })?;

        let file_name = archive_file_name(&mongo.database, Utc::now(), self.exporter.extension());
        let archive_path = self.backup_dir.join(file_name);

        self.exporter
            .export(&mongo, &archive_path)
            .await
            .with_context(|| format!("Backup of database '{}' failed", mongo.database))?;
        info!(path = %archive_path.display(), "Backup created");

        let object_key = upload_backup(self.store.as_ref(), &archive_path)
            .await
            .context("Upload to object storage failed")?;
        info!(key = %object_key, "Backup uploaded to S3");

        let retention_days = retention_days_from_lookup(&*self.env);
        let removed = sweep_old_backups(&self.backup_dir, retention_days, SystemTime::now())
            .context("Cleanup of old backups failed")?;

        Ok(RunReport { archive_path, object_key, removed })
    }
}
