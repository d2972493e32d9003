use crate::entities;
use crate::errors::GateError;
use crate::storage;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub const CLEANUP_AUDIT_EVENTS: &str = "cleanup_expired_audit_events";

/// Jobs known to the scheduler: (name, description, schedule)
pub const AVAILABLE_JOBS: &[(&str, &str, &str)] = &[(
    CLEANUP_AUDIT_EVENTS,
    "Purge audit events older than the retention window",
    "Daily at 03:00",
)];

/// Initialize and start the job scheduler with all background tasks
pub async fn init_scheduler(
    db: DatabaseConnection,
    retention_days: u32,
) -> Result<JobScheduler, GateError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| GateError::Other(format!("Failed to create job scheduler: {}", e)))?;

    let db_clone = db.clone();

    // Audit retention job - runs daily at 03:00
    let cleanup_audit_job = Job::new_async("0 0 3 * * *", move |_uuid, _l| {
        let db = db_clone.clone();
        Box::pin(async move {
            info!("Running {} job", CLEANUP_AUDIT_EVENTS);
            if let Err(e) = run_job(&db, CLEANUP_AUDIT_EVENTS, retention_days).await {
                error!("Failed to record {} execution: {}", CLEANUP_AUDIT_EVENTS, e);
            }
        })
    })
    .map_err(|e| GateError::Other(format!("Failed to create audit cleanup job: {}", e)))?;

    sched
        .add(cleanup_audit_job)
        .await
        .map_err(|e| GateError::Other(format!("Failed to add audit cleanup job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| GateError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!("Job scheduler started with {} jobs", AVAILABLE_JOBS.len());

    Ok(sched)
}

/// Record the start of a job execution
pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<i64, GateError> {
    use entities::job_execution;

    let execution = job_execution::ActiveModel {
        job_name: Set(job_name.to_string()),
        started_at: Set(Utc::now().timestamp()),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        records_processed: Set(None),
        ..Default::default()
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a job execution
pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    success: bool,
    error_message: Option<String>,
    records_processed: Option<i64>,
) -> Result<(), GateError> {
    use entities::job_execution::{Column, Entity};

    if let Some(execution) = Entity::find()
        .filter(Column::Id.eq(execution_id))
        .one(db)
        .await?
    {
        let mut active = execution.into_active_model();
        active.completed_at = Set(Some(Utc::now().timestamp()));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.records_processed = Set(records_processed);
        active.update(db).await?;
    }

    Ok(())
}

/// Manually trigger a job by name (used by the admin API)
pub async fn trigger_job_manually(
    db: &DatabaseConnection,
    job_name: &str,
    retention_days: u32,
) -> Result<u64, GateError> {
    info!("Manually triggering job: {}", job_name);
    if !AVAILABLE_JOBS.iter().any(|(name, _, _)| *name == job_name) {
        return Err(GateError::Other(format!("Unknown job name: {}", job_name)));
    }
    run_job(db, job_name, retention_days).await
}

/// Run a job body with execution bookkeeping. Job failures are recorded,
/// not returned; only bookkeeping failures surface as errors.
async fn run_job(
    db: &DatabaseConnection,
    job_name: &str,
    retention_days: u32,
) -> Result<u64, GateError> {
    let execution_id = start_job_execution(db, job_name).await?;

    let result = match job_name {
        CLEANUP_AUDIT_EVENTS => storage::cleanup_expired_audit_events(db, retention_days).await,
        _ => return Err(GateError::Other(format!("Unknown job name: {}", job_name))),
    };

    match result {
        Ok(count) => {
            info!("Job {} completed: {} records", job_name, count);
            complete_job_execution(db, execution_id, true, None, Some(count as i64)).await?;
            Ok(count)
        }
        Err(e) => {
            error!("Job {} failed: {}", job_name, e);
            complete_job_execution(db, execution_id, false, Some(e.to_string()), None).await?;
            Ok(0)
        }
    }
}
