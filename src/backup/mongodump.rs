// mongobackup/src/backup/mongodump.rs
use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use super::Exporter;
use super::archive::create_tar_gz_archive;
use crate::config::MongoConfig;
use crate::errors::AppError;
use crate::utils::find_mongodump_executable;

/// Runs an external dump of one database into a directory.
#[async_trait]
pub trait DumpExecutor: Send + Sync {
    async fn dump(&self, config: &MongoConfig, out_dir: &Path) -> Result<()>;
}

/// Arguments for `mongodump`. Auth flags are only passed when both
/// username and password are configured.
pub fn mongodump_args(config: &MongoConfig, out_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--host".into(),
        config.host.clone().into(),
        "--port".into(),
        config.port.to_string().into(),
        "--db".into(),
        config.database.clone().into(),
    ];
    if let Some((user, pass)) = config.credentials() {
        let auth: [OsString; 6] = [
            "--username".into(),
            user.into(),
            "--password".into(),
            pass.into(),
            "--authenticationDatabase".into(),
            config.auth_source.clone().into(),
        ];
        args.extend(auth);
    }
    args.push("--out".into());
    args.push(out_dir.as_os_str().to_owned());
    args
}

/// Runs `program` to completion. A non-zero exit becomes `AppError::Command`
/// carrying the captured output, with the exit status as context.
pub async fn run_dump_command(program: &Path, args: Vec<OsString>) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to execute {}", program.display()))?;

    if !output.status.success() {
        return Err(AppError::Command {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
        .with_context(|| format!("{} exited with status: {}", program.display(), output.status));
    }
    Ok(())
}

pub struct MongodumpExecutor;

#[async_trait]
impl DumpExecutor for MongodumpExecutor {
    async fn dump(&self, config: &MongoConfig, out_dir: &Path) -> Result<()> {
        let mongodump_path = find_mongodump_executable()?;
        info!(
            executable = %mongodump_path.display(),
            database = %config.database,
            out = %out_dir.display(),
            "Running mongodump"
        );

        run_dump_command(&mongodump_path, mongodump_args(config, out_dir))
            .await
            .with_context(|| format!("mongodump for database {} failed", config.database))?;

        info!(database = %config.database, "✓ mongodump finished");
        Ok(())
    }
}

/// Exporter that dumps with an external tool and bundles the result as `.tar.gz`.
pub struct DumpArchiveExporter<E: DumpExecutor = MongodumpExecutor> {
    executor: E,
}

impl DumpArchiveExporter<MongodumpExecutor> {
    pub fn new() -> Self {
        DumpArchiveExporter { executor: MongodumpExecutor }
    }
}

impl Default for DumpArchiveExporter<MongodumpExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl<E: DumpExecutor> DumpArchiveExporter<E> {
    pub fn with_executor(executor: E) -> Self {
        DumpArchiveExporter { executor }
    }
}

#[async_trait]
impl<E: DumpExecutor> Exporter for DumpArchiveExporter<E> {
    fn extension(&self) -> &'static str {
        ".tar.gz"
    }

    async fn export(&self, config: &MongoConfig, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .with_context(|| format!("Archive path has no parent directory: {}", dest.display()))?;
        // Dropping the TempDir on an early return removes the partial dump.
        let dump_dir = tempfile::Builder::new()
            .prefix("dump_")
            .tempdir_in(parent)
            .with_context(|| format!("Failed to create temporary dump directory in {}", parent.display()))?;

        self.executor.dump(config, dump_dir.path()).await?;

        let source_dir = dump_dir.path().to_path_buf();
        let archive_path = dest.to_path_buf();
        tokio::task::spawn_blocking(move || create_tar_gz_archive(&source_dir, &archive_path))
            .await
            .context("Archive task panicked")??;

        dump_dir
            .close()
            .context("Failed to remove temporary dump directory")?;
        info!(file = %dest.display(), "✅ Dump archive completed successfully");
        Ok(())
    }
}
