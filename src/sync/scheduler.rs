use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tokio::time::interval;
use uuid::Uuid;

use crate::choices::{JobKind, JobStatus, SyncStatus};
use crate::common::AppState;
use crate::entity::{ingestions, jobs, sources, syncs};
use crate::error::{AppError, AppResult};
use crate::sync::{runner, snapshots};

/// Queue a background job.
///
/// # Errors
///
/// Returns `AppError::Database` on store failure.
#[allow(clippy::too_many_arguments)]
pub async fn enqueue(
    db: &DatabaseConnection,
    kind: JobKind,
    object_id: Uuid,
    name: &str,
    user: Option<&str>,
    schedule_at: Option<DateTime<Utc>>,
    interval_minutes: Option<i32>,
    adhoc: bool,
) -> AppResult<jobs::Model> {
    let job = jobs::ActiveModel {
        id: Set(Uuid::new_v4()),
        kind: Set(kind.as_str().to_string()),
        object_id: Set(object_id),
        name: Set(name.to_string()),
        user: Set(user.map(ToString::to_string)),
        status: Set(JobStatus::Pending.as_str().to_string()),
        scheduled: Set(schedule_at.map(Into::into)),
        interval_minutes: Set(interval_minutes),
        adhoc: Set(adhoc),
        data: Set(None),
        error: Set(None),
        created_at: Set(Some(Utc::now().into())),
        started_at: Set(None),
        completed_at: Set(None),
    };
    Ok(job.insert(db).await?)
}

/// Queue an ingestion run for a sync: the snapshot catalog refresh first,
/// then the ingestion itself (immediately for ad hoc runs, at the
/// configured time for scheduled ones).
///
/// # Errors
///
/// Returns `AppError::Database` on store failure.
pub async fn enqueue_sync(
    db: &DatabaseConnection,
    sync: &syncs::Model,
    source_id: Uuid,
    adhoc: bool,
) -> AppResult<jobs::Model> {
    syncs::Entity::update_many()
        .col_expr(
            syncs::Column::Status,
            Expr::value(SyncStatus::Queued.as_str()),
        )
        .filter(syncs::Column::Id.eq(sync.id))
        .exec(db)
        .await?;

    enqueue(
        db,
        JobKind::SnapshotSync,
        source_id,
        &format!("{} Snapshot Sync (Pre Ingestion)", sync.name),
        sync.user.as_deref(),
        None,
        None,
        true,
    )
    .await?;

    let (label, schedule_at) = if adhoc {
        ("adhoc", None)
    } else {
        ("scheduled", sync.scheduled.map(|t| t.with_timezone(&Utc)))
    };
    enqueue(
        db,
        JobKind::Ingestion,
        sync.id,
        &format!("{} - ({label})", sync.name),
        sync.user.as_deref(),
        schedule_at,
        sync.interval_minutes,
        adhoc,
    )
    .await
}

/// Job worker loop: claim due jobs one at a time and run them. Jobs are
/// claimed with an atomic check-and-set so multiple workers never execute
/// the same job twice.
pub async fn run_job_worker(state: AppState) {
    let poll = state.config.job_poll_interval_seconds;
    tracing::info!(poll_interval_secs = poll, "Starting job worker");

    let mut ticker = interval(Duration::from_secs(poll));
    loop {
        ticker.tick().await;
        if let Err(e) = process_due_jobs(&state).await {
            tracing::error!(error = %e, "Job worker pass failed");
        }
    }
}

async fn process_due_jobs(state: &AppState) -> AppResult<()> {
    let db = &state.db;
    let due = jobs::Entity::find()
        .filter(jobs::Column::Status.eq(JobStatus::Pending.as_str()))
        .filter(
            Condition::any()
                .add(jobs::Column::Scheduled.is_null())
                .add(jobs::Column::Scheduled.lte(Utc::now())),
        )
        .order_by_asc(jobs::Column::CreatedAt)
        .all(db)
        .await?;

    for job in due {
        let claimed = jobs::Entity::update_many()
            .col_expr(
                jobs::Column::Status,
                Expr::value(JobStatus::Running.as_str()),
            )
            .col_expr(jobs::Column::StartedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Id.eq(job.id))
            .filter(jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .exec(db)
            .await?;
        if claimed.rows_affected == 0 {
            continue;
        }

        tracing::info!(job = %job.name, kind = %job.kind, "Job started");

        // Run in a task of its own so a panic errors the job instead of
        // killing the worker.
        let handle = tokio::spawn(dispatch(state.clone(), job.clone()));
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(AppError::Sync(format!("Job task panicked: {e}"))),
        };

        match &outcome {
            Ok(()) => {
                terminate(db, job.id, JobStatus::Completed, None).await;
                tracing::info!(job = %job.name, "Job completed");
            }
            Err(e) => {
                terminate(db, job.id, JobStatus::Errored, Some(e.to_string())).await;
                tracing::error!(job = %job.name, error = %e, "Job errored");
                // A rejected duplicate run must not clobber the status of
                // the run that is actually in progress.
                if !matches!(e, AppError::MutualExclusion(_)) {
                    mark_object_failed(db, &job).await;
                }
            }
        }

        requeue_recurring(db, &job).await;
    }

    Ok(())
}

async fn dispatch(state: AppState, job: jobs::Model) -> AppResult<()> {
    match JobKind::parse(&job.kind) {
        Some(JobKind::SnapshotSync) => {
            snapshots::sync_source_snapshots(&state, job.object_id, Some(job.id)).await
        }
        Some(JobKind::Ingestion) => runner::run_ingestion(&state, job.object_id, Some(job.id)).await,
        Some(JobKind::Merge) => runner::run_merge(&state, job.object_id).await,
        None => Err(AppError::Sync(format!("Unknown job kind `{}`.", job.kind))),
    }
}

/// Reflect a job failure on the object it was running for, covering
/// errors raised before the run claimed its status.
async fn mark_object_failed(db: &DatabaseConnection, job: &jobs::Model) {
    let result = match JobKind::parse(&job.kind) {
        Some(JobKind::SnapshotSync) => {
            sources::Entity::update_many()
                .col_expr(
                    sources::Column::Status,
                    Expr::value(SyncStatus::Failed.as_str()),
                )
                .filter(sources::Column::Id.eq(job.object_id))
                .exec(db)
                .await
        }
        Some(JobKind::Ingestion) => {
            syncs::Entity::update_many()
                .col_expr(
                    syncs::Column::Status,
                    Expr::value(SyncStatus::Failed.as_str()),
                )
                .filter(syncs::Column::Id.eq(job.object_id))
                .exec(db)
                .await
        }
        Some(JobKind::Merge) => {
            match ingestions::Entity::find_by_id(job.object_id).one(db).await {
                Ok(Some(ingestion)) => {
                    syncs::Entity::update_many()
                        .col_expr(
                            syncs::Column::Status,
                            Expr::value(SyncStatus::Failed.as_str()),
                        )
                        .filter(syncs::Column::Id.eq(ingestion.sync_id))
                        .exec(db)
                        .await
                }
                Ok(None) => return,
                Err(e) => Err(e),
            }
        }
        None => return,
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to record failure status");
    }
}

async fn terminate(db: &DatabaseConnection, job_id: Uuid, status: JobStatus, error: Option<String>) {
    let result = jobs::Entity::update_many()
        .col_expr(jobs::Column::Status, Expr::value(status.as_str()))
        .col_expr(jobs::Column::CompletedAt, Expr::value(Utc::now()))
        .col_expr(jobs::Column::Error, Expr::value(error))
        .filter(jobs::Column::Id.eq(job_id))
        .exec(db)
        .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to update job status");
    }
}

/// Recurrence outlives failures: a non-adhoc ingestion of a sync with an
/// interval requeues the next run at `last_synced + interval` regardless
/// of this run's outcome.
async fn requeue_recurring(db: &DatabaseConnection, job: &jobs::Model) {
    if job.adhoc || JobKind::parse(&job.kind) != Some(JobKind::Ingestion) {
        return;
    }
    let sync = match syncs::Entity::find_by_id(job.object_id).one(db).await {
        Ok(Some(sync)) => sync,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load sync for requeue");
            return;
        }
    };
    let Some(interval_minutes) = sync.interval_minutes else {
        return;
    };

    let base = sync
        .last_synced
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let next = base + chrono::Duration::minutes(i64::from(interval_minutes));

    let result = enqueue(
        db,
        JobKind::Ingestion,
        sync.id,
        &format!("{} - (scheduled)", sync.name),
        sync.user.as_deref(),
        Some(next),
        Some(interval_minutes),
        false,
    )
    .await;
    match result {
        Ok(_) => {
            tracing::info!(sync = %sync.name, next = %next, "Requeued recurring sync");
        }
        Err(e) => {
            tracing::error!(sync = %sync.name, error = %e, "Failed to requeue recurring sync");
        }
    }
}

/// Periodically refresh the snapshot catalog of every source that is not
/// already busy.
pub async fn run_snapshot_refresh(state: AppState) {
    let interval_secs = state.config.snapshot_refresh_interval_seconds;
    tracing::info!(interval_secs, "Starting snapshot catalog refresh scheduler");

    let mut ticker = interval(Duration::from_secs(interval_secs));
    loop {
        ticker.tick().await;
        if let Err(e) = queue_snapshot_refreshes(&state).await {
            tracing::error!(error = %e, "Snapshot refresh pass failed");
        }
    }
}

async fn queue_snapshot_refreshes(state: &AppState) -> AppResult<()> {
    let db = &state.db;
    let ready = sources::Entity::find()
        .filter(
            sources::Column::Status.is_not_in([
                SyncStatus::Queued.as_str(),
                SyncStatus::Syncing.as_str(),
            ]),
        )
        .all(db)
        .await?;

    for source in ready {
        sources::Entity::update_many()
            .col_expr(
                sources::Column::Status,
                Expr::value(SyncStatus::Queued.as_str()),
            )
            .filter(sources::Column::Id.eq(source.id))
            .exec(db)
            .await?;
        enqueue(
            db,
            JobKind::SnapshotSync,
            source.id,
            &format!("{} Snapshot Sync", source.name),
            None,
            None,
            None,
            true,
        )
        .await?;
    }
    Ok(())
}
