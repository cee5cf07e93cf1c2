// Job Scheduler - owns the cron scheduler and the recent execution log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::{AutoInvoicingJob, AutoInvoicingResult};
use crate::config::Config;
use crate::error::AppError;

/// Execution logs kept in memory
pub const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Job execution error: {0}")]
    ExecutionError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::DatabaseError(e) => e.into(),
            JobError::ConfigError(msg) => AppError::BadRequest(msg),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    PartialFailure,
}

impl JobExecutionLog {
    pub fn from_auto_invoicing(
        started_at: DateTime<Utc>,
        outcome: &JobResult<AutoInvoicingResult>,
    ) -> Self {
        let completed_at = Utc::now();
        let (status, items_processed, errors) = match outcome {
            Ok(result) if result.errors.is_empty() => {
                (JobStatus::Completed, result.documents_issued, Vec::new())
            }
            Ok(result) => (
                JobStatus::PartialFailure,
                result.documents_issued,
                result.errors.clone(),
            ),
            Err(e) => (JobStatus::Failed, 0, vec![e.to_string()]),
        };

        Self {
            id: Uuid::new_v4(),
            job_name: "Auto Invoicing".to_string(),
            started_at,
            completed_at: Some(completed_at),
            status,
            items_processed,
            errors,
            duration_ms: Some((completed_at - started_at).num_milliseconds()),
        }
    }
}

/// Append a log entry, dropping the oldest past `MAX_EXECUTION_LOGS`
pub fn push_log(logs: &mut Vec<JobExecutionLog>, log: JobExecutionLog) {
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        let excess = logs.len() - MAX_EXECUTION_LOGS;
        logs.drain(..excess);
    }
}

/// Recent job runs, shared between the scheduler and the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, log: JobExecutionLog) {
        push_log(&mut *self.entries.write().await, log);
    }

    /// Oldest first
    pub async fn recent(&self) -> Vec<JobExecutionLog> {
        self.entries.read().await.clone()
    }
}

/// Run a job by name outside its schedule and record the outcome
pub async fn run_job_now(
    db_pool: PgPool,
    config: &Config,
    logs: &ExecutionLog,
    job_name: &str,
) -> JobResult<AutoInvoicingResult> {
    match job_name {
        "auto_invoicing" | "auto-invoicing" => {
            let started_at = Utc::now();
            let job = AutoInvoicingJob::new(db_pool, &config.accounting, &config.auto_invoicing);
            let outcome = job.run().await;
            logs.record(JobExecutionLog::from_auto_invoicing(started_at, &outcome)).await;
            outcome
        }
        _ => Err(JobError::ConfigError(format!("Unknown job: {}", job_name))),
    }
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    db_pool: PgPool,
    config: Config,
    execution_logs: ExecutionLog,
}

impl JobScheduler {
    pub async fn new(db_pool: PgPool, config: Config, execution_logs: ExecutionLog) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            db_pool,
            config,
            execution_logs,
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_auto_invoicing().await?;

        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_auto_invoicing(&self) -> JobResult<()> {
        if !self.config.auto_invoicing.enabled {
            info!("Auto-invoicing is disabled, skipping auto-invoicing job");
            return Ok(());
        }

        let cron_expr = self.config.auto_invoicing.cron_expression();
        let db_pool = self.db_pool.clone();
        let config = self.config.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let db_pool = db_pool.clone();
            let config = config.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                info!("Running auto-invoicing job");

                let job = AutoInvoicingJob::new(db_pool, &config.accounting, &config.auto_invoicing);
                let outcome = job.run().await;

                match &outcome {
                    Ok(result) => info!(
                        "Auto-invoicing completed: {} checked, {} issued, {} already invoiced",
                        result.transactions_checked, result.documents_issued, result.already_invoiced
                    ),
                    Err(e) => error!("Auto-invoicing failed: {}", e),
                }

                logs.record(JobExecutionLog::from_auto_invoicing(started_at, &outcome)).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!(
            "Scheduled auto-invoicing every {} minutes",
            self.config.auto_invoicing.interval_minutes
        );

        Ok(())
    }
}
