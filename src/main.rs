//! MongoDB Backup Service
//!
//! Exports a MongoDB database to a compressed archive, uploads it to S3 and
//! prunes old local archives, once at startup and then on a cron schedule.

// mongobackup/src/main.rs
mod backup;
mod config;
mod errors;
mod scheduler;
mod utils;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use backup::db_dump::StreamingExporter;
use backup::mongodump::DumpArchiveExporter;
use backup::s3_upload::S3Store;
use backup::{BackupPipeline, Exporter};
use chrono::Local;
use config::{AppConfig, ExporterKind, process_env};
use scheduler::{BackupRunner, BackupScheduler, RunOutcome, Trigger};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match run_app().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let app_config = AppConfig::from_env().context("Failed to load configuration from environment")?;
    info!(
        backup_dir = %app_config.backup_dir.display(),
        exporter = ?app_config.exporter,
        "Loaded configuration"
    );

    let exporter: Arc<dyn Exporter> = match app_config.exporter {
        ExporterKind::Stream => Arc::new(StreamingExporter::new()),
        ExporterKind::Mongodump => Arc::new(DumpArchiveExporter::new()),
    };
    let store = Arc::new(S3Store::from_config(&app_config.s3).await);
    let pipeline = Arc::new(BackupPipeline::new(
        app_config.backup_dir.clone(),
        exporter,
        store,
        process_env(),
    ));
    let runner = BackupRunner::new(pipeline);

    let startup_runner = runner.clone();
    tokio::spawn(async move {
        if let RunOutcome::Completed(report) = startup_runner.run(Trigger::Startup).await {
            info!(
                archive = %report.archive_path.display(),
                key = %report.object_key,
                "Startup backup stored"
            );
        }
    });

    let mut scheduler = BackupScheduler::new(runner).await?;
    let job_id = scheduler.schedule(&app_config.cron_schedule).await?;
    scheduler.start().await.context("Failed to start cron scheduler")?;
    info!(schedule = %app_config.cron_schedule, "🚀 MongoDB backup service started");
    if let Some(next) = scheduler.next_run(job_id).await {
        info!(next = %next.with_timezone(&Local), "Next backup scheduled");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping scheduler");
    scheduler.shutdown().await?;
    Ok(())
}
