pub(crate) mod archive;   // tar.gz bundling of dump directories
pub(crate) mod db_dump;   // in-process streaming export
pub(crate) mod logic;     // run orchestration: export -> upload -> sweep
pub(crate) mod mongodump; // external mongodump export
pub(crate) mod retention; // local archive sweeping
pub(crate) mod s3_upload; // object storage upload
#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MongoConfig;

pub use logic::BackupPipeline;

/// Produces one local archive of the configured database.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// File extension of the archives this exporter writes, including the dot.
    fn extension(&self) -> &'static str;

    /// Writes the archive to `dest`. Partial output is left in place on error.
    async fn export(&self, config: &MongoConfig, dest: &Path) -> Result<()>;
}

/// `<database>_<ISO timestamp with ':' and '.' replaced by '-'><extension>`,
/// e.g. `shop_2024-03-01T06-00-00-123Z.json.gz`.
pub fn archive_file_name(database: &str, started_at: DateTime<Utc>, extension: &str) -> String {
    let timestamp = started_at
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-");
    format!("{}_{}{}", database, timestamp, extension)
}
