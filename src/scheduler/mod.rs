use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backup::BackupPipeline;
use crate::backup::logic::RunReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Cron,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Cron => "cron",
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    Failed,
    /// Another run held the lock.
    Skipped,
}

/// Runs the pipeline behind a process-wide lock so startup and cron
/// triggers never overlap on the backup directory.
#[derive(Clone)]
pub struct BackupRunner {
    pipeline: Arc<BackupPipeline>,
    run_lock: Arc<Mutex<()>>,
}

impl BackupRunner {
    pub fn new(pipeline: Arc<BackupPipeline>) -> Self {
        BackupRunner { pipeline, run_lock: Arc::new(Mutex::new(())) }
    }

    /// Never returns an error: failures are logged and the next trigger
    /// proceeds as usual.
    pub async fn run(&self, trigger: Trigger) -> RunOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!(trigger = trigger.as_str(), "Skipping backup run: previous run still in progress");
            return RunOutcome::Skipped;
        };

        info!(trigger = trigger.as_str(), started_at = %Utc::now().to_rfc3339(), "Starting backup job...");
        match self.pipeline.run().await {
            Ok(report) => {
                info!(
                    trigger = trigger.as_str(),
                    key = %report.object_key,
                    removed = report.removed.len(),
                    "Backup job completed successfully"
                );
                RunOutcome::Completed(report)
            }
            Err(e) => {
                error!(trigger = trigger.as_str(), error = %format!("{:#}", e), "Backup job failed");
                RunOutcome::Failed
            }
        }
    }
}

/// Accepts classic five-field crontab lines by adding the seconds field the
/// scheduler expects. Six and seven field expressions pass through.
pub fn normalize_cron(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

pub struct BackupScheduler {
    scheduler: JobScheduler,
    runner: BackupRunner,
}

impl BackupScheduler {
    pub async fn new(runner: BackupRunner) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(BackupScheduler { scheduler, runner })
    }

    /// Registers the backup job; schedules are evaluated in UTC.
    pub async fn schedule(&mut self, cron_expression: &str) -> Result<Uuid> {
        let expression = normalize_cron(cron_expression);
        let runner = self.runner.clone();

        let job = Job::new_async(expression.as_str(), move |_uuid, _lock| {
            let runner = runner.clone();
            Box::pin(async move {
                runner.run(Trigger::Cron).await;
            })
        })
        .with_context(|| format!("Invalid cron schedule '{}'", cron_expression))?;

        let job_id = self.scheduler.add(job).await?;
        info!(cron = %cron_expression, normalized = %expression, "Backup job scheduled");
        Ok(job_id)
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn next_run(&mut self, job_id: Uuid) -> Option<DateTime<Utc>> {
        match self.scheduler.next_tick_for_job(job_id).await {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Could not compute next backup time");
                None
            }
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        Ok(())
    }
}
