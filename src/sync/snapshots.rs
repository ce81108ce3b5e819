use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::choices::{SnapshotStatus, SyncStatus};
use crate::common::AppState;
use crate::entity::{jobs, snapshots, sources};
use crate::error::{AppError, AppResult};
use crate::forward::models::SnapshotRecord;
use crate::forward::ForwardClient;
use crate::sync::logging::SyncLogging;

/// Refresh the snapshot catalog of one source from the remote API.
/// Sentinel refs and snapshots that are not loaded are dropped; the rest
/// are upserted keyed by (source, snapshot id).
///
/// # Errors
///
/// `AppError::MutualExclusion` when the source is already syncing;
/// remote/store errors after the FAILED status has been recorded.
pub async fn sync_source_snapshots(
    state: &AppState,
    source_id: Uuid,
    job_id: Option<Uuid>,
) -> AppResult<()> {
    let db = &state.db;
    let mut logger = SyncLogging::new();

    let source = sources::Entity::find_by_id(source_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Sync(format!("Source {source_id} not found.")))?;

    let claimed = sources::Entity::update_many()
        .col_expr(
            sources::Column::Status,
            Expr::value(SyncStatus::Syncing.as_str()),
        )
        .filter(sources::Column::Id.eq(source.id))
        .filter(sources::Column::Status.ne(SyncStatus::Syncing.as_str()))
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(AppError::MutualExclusion(
            "syncing already in progress.".to_string(),
        ));
    }

    let result = refresh_snapshots(state, &source, &mut logger).await;

    let status = match &result {
        Ok(()) => SyncStatus::Completed,
        Err(e) => {
            logger.log_failure(format!("Syncing snapshots failed: `{e}`"));
            tracing::error!(source = %source.name, error = %e, "Snapshot sync failed");
            SyncStatus::Failed
        }
    };
    sources::Entity::update_many()
        .col_expr(sources::Column::Status, Expr::value(status.as_str()))
        .col_expr(sources::Column::LastSynced, Expr::value(Utc::now()))
        .filter(sources::Column::Id.eq(source.id))
        .exec(db)
        .await?;

    if let Some(job_id) = job_id {
        let update = jobs::Entity::update_many()
            .col_expr(jobs::Column::Data, Expr::value(logger.log_data()))
            .filter(jobs::Column::Id.eq(job_id))
            .exec(db)
            .await;
        if let Err(e) = update {
            tracing::warn!(error = %e, "Failed to store snapshot sync log on job");
        }
    }

    result
}

async fn refresh_snapshots(
    state: &AppState,
    source: &sources::Model,
    logger: &mut SyncLogging,
) -> AppResult<()> {
    let db = &state.db;
    logger.log_info(format!("Syncing snapshots from {}", source.name));
    tracing::debug!(url = %source.url, "Syncing snapshots");

    let timeout = source
        .timeout_secs
        .map(|s| Duration::from_secs(s.max(1) as u64))
        .unwrap_or(Duration::from_secs(state.config.forward_default_timeout_seconds));
    let client = ForwardClient::new(
        &source.url,
        source.auth_token.as_deref(),
        source.verify_tls,
        Some(timeout),
        source.network_id.clone(),
    )?;

    let now = Utc::now();
    for record in client.list_snapshots().await? {
        if record.is_sentinel() || !record.is_loaded() {
            continue;
        }
        let Some(snapshot_id) = record.id().map(ToString::to_string) else {
            continue;
        };
        let name = record
            .display_name()
            .unwrap_or(snapshot_id.as_str())
            .to_string();
        let date = snapshot_date(&record).unwrap_or(now);

        let existing = snapshots::Entity::find()
            .filter(snapshots::Column::SourceId.eq(source.id))
            .filter(snapshots::Column::SnapshotId.eq(snapshot_id.as_str()))
            .one(db)
            .await?;

        match existing {
            Some(snapshot) => {
                let mut active: snapshots::ActiveModel = snapshot.into();
                active.name = Set(name.clone());
                active.data = Set(Some(record.metadata()));
                active.date = Set(Some(date.into()));
                active.status = Set(SnapshotStatus::Loaded.as_str().to_string());
                active.updated_at = Set(Some(now.into()));
                active.update(db).await?;
            }
            None => {
                let snapshot = snapshots::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    source_id: Set(source.id),
                    snapshot_id: Set(snapshot_id.clone()),
                    name: Set(name.clone()),
                    data: Set(Some(record.metadata())),
                    date: Set(Some(date.into())),
                    status: Set(SnapshotStatus::Loaded.as_str().to_string()),
                    created_at: Set(Some(now.into())),
                    updated_at: Set(Some(now.into())),
                };
                snapshot.insert(db).await?;
            }
        }
        logger.log_info(format!("Created/Updated snapshot {name} ({snapshot_id})"));
    }

    logger.log_success(format!("Completed syncing snapshots from {}", source.name));
    tracing::debug!(url = %source.url, "Completed syncing snapshots");
    Ok(())
}

/// Start time of the snapshot: RFC 3339 or epoch seconds, whichever the
/// deployment emits.
fn snapshot_date(record: &SnapshotRecord) -> Option<DateTime<Utc>> {
    let raw = record.start.as_deref()?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_date_accepts_rfc3339_and_epoch() {
        let rfc: SnapshotRecord = serde_json::from_value(
            json!({"snapshot_id": "1", "start": "2026-01-28T10:30:00+00:00"}),
        )
        .unwrap();
        assert_eq!(
            snapshot_date(&rfc).unwrap().to_rfc3339(),
            "2026-01-28T10:30:00+00:00"
        );

        let epoch: SnapshotRecord =
            serde_json::from_value(json!({"snapshot_id": "2", "start": "1769600000"})).unwrap();
        assert!(snapshot_date(&epoch).is_some());

        let none: SnapshotRecord =
            serde_json::from_value(json!({"snapshot_id": "3", "start": "soon"})).unwrap();
        assert!(snapshot_date(&none).is_none());
    }
}
