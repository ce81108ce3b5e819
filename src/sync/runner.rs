use std::time::Duration;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde_json::Value;
use uuid::Uuid;

use crate::choices::{JobKind, SyncStatus};
use crate::common::AppState;
use crate::entity::{ingestion_issues, ingestions, jobs, snapshots, sources, syncs};
use crate::error::{AppError, AppResult, PipelineError, RecordError};
use crate::forward::ForwardClient;
use crate::sync::context::SyncScope;
use crate::sync::kinds::EntityKind;
use crate::sync::logging::SyncLogging;
use crate::sync::resolve::ReferenceResolver;
use crate::sync::transform::{
    FieldValue, LookupValue, Rendered, TransformEngine, TransformRuleSet, TransformSpec,
};
use crate::sync::upsert::{Upserter, UpsertResult};
use crate::sync::{branch, scheduler};

/// Run one ingestion end to end: validate, claim the sync, provision a
/// branch, pull and transform every enabled entity type, then tear down
/// and record the outcome. Record-level failures become ingestion issues;
/// anything else fails the run.
///
/// # Errors
///
/// Returns the run-level error after the terminal status and the log
/// payload have been persisted.
pub async fn run_ingestion(
    state: &AppState,
    sync_id: Uuid,
    job_id: Option<Uuid>,
) -> AppResult<()> {
    let mut logger = SyncLogging::new();
    let outcome = execute(state, sync_id, job_id, &mut logger).await;

    if let Err(e) = &outcome {
        logger.log_failure(format!("Ingestion failed: `{e}`"));
    }
    if let Some(job_id) = job_id {
        let update = jobs::Entity::update_many()
            .col_expr(jobs::Column::Data, Expr::value(logger.log_data()))
            .filter(jobs::Column::Id.eq(job_id))
            .exec(&state.db)
            .await;
        if let Err(e) = update {
            tracing::warn!(error = %e, "Failed to store run log on job");
        }
    }
    outcome
}

async fn execute(
    state: &AppState,
    sync_id: Uuid,
    job_id: Option<Uuid>,
    logger: &mut SyncLogging,
) -> AppResult<()> {
    let db = &state.db;
    let sync = syncs::Entity::find_by_id(sync_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Sync(format!("Sync {sync_id} not found.")))?;
    let snapshot = snapshots::Entity::find_by_id(sync.snapshot_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Sync("Sync references a missing snapshot.".to_string()))?;
    let source = sources::Entity::find_by_id(snapshot.source_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Sync("Snapshot references a missing source.".to_string()))?;

    // Validation gate: everything here happens before any API call.
    if snapshot.status != "loaded" {
        logger.log_failure("Snapshot not loaded in Forward.");
        return Err(AppError::Sync("Snapshot not loaded in Forward.".to_string()));
    }

    let rules = TransformRuleSet::load(db, &sync.group_ids()).await?;
    let enabled: Vec<EntityKind> = EntityKind::NQE_SEQUENCE
        .into_iter()
        .filter(|kind| sync.type_enabled(kind.short_name()))
        .collect();
    let missing = rules.missing_prerequisites(&enabled);
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|k| k.model_key()).collect();
        let message = format!(
            "Combination of these transform map groups failed validation. Missing maps: {}.",
            names.join(", ")
        );
        logger.log_failure(message.clone());
        return Err(AppError::Sync(message));
    }

    // Mutual exclusion: atomic check-and-set against the store, safe under
    // concurrent job execution.
    let claimed = syncs::Entity::update_many()
        .col_expr(
            syncs::Column::Status,
            Expr::value(SyncStatus::Syncing.as_str()),
        )
        .filter(syncs::Column::Id.eq(sync.id))
        .filter(syncs::Column::Status.ne(SyncStatus::Syncing.as_str()))
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(AppError::MutualExclusion(
            "syncing already in progress.".to_string(),
        ));
    }

    logger.log_info(format!("Ingesting data from {}", source.name));
    tracing::info!(sync = %sync.name, source = %source.name, "Starting ingestion");

    let ingestion = ingestions::ActiveModel {
        id: Set(Uuid::new_v4()),
        sync_id: Set(sync.id),
        job_id: Set(job_id),
        branch_id: Set(None),
        created_at: Set(Some(Utc::now().into())),
    }
    .insert(db)
    .await?;

    let run = ingest_into_branch(state, &sync, &source, &rules, &ingestion, logger).await;

    let status = match &run {
        Ok(()) => SyncStatus::Completed,
        Err(e) => {
            tracing::error!(sync = %sync.name, error = %e, "Ingestion failed");
            SyncStatus::Failed
        }
    };
    syncs::Entity::update_many()
        .col_expr(syncs::Column::Status, Expr::value(status.as_str()))
        .col_expr(syncs::Column::LastSynced, Expr::value(Utc::now()))
        .filter(syncs::Column::Id.eq(sync.id))
        .exec(db)
        .await?;
    logger.log_info(format!("Completed ingesting data from {}", source.name));

    if status == SyncStatus::Completed && sync.auto_merge {
        scheduler::enqueue(
            db,
            JobKind::Merge,
            ingestion.id,
            &format!("{} Merge", sync.name),
            sync.user.as_deref(),
            None,
            None,
            true,
        )
        .await?;
        logger.log_info("Auto merge job enqueued.");
        tracing::info!(sync = %sync.name, "Auto merge job enqueued");
    }

    run
}

async fn ingest_into_branch(
    state: &AppState,
    sync: &syncs::Model,
    source: &sources::Model,
    rules: &TransformRuleSet,
    ingestion: &ingestions::Model,
    logger: &mut SyncLogging,
) -> AppResult<()> {
    let db = &state.db;

    let branch_name = format!("Forward Sync {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    let branch = branch::create_branch(db, &branch_name, sync.user.as_deref()).await?;

    let mut link: ingestions::ActiveModel = ingestion.clone().into();
    link.branch_id = Set(Some(branch.id));
    link.update(db).await?;

    branch::provision(db, &branch).await?;
    logger.log_info(format!("New branch created {}", branch.name));

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

    let scope = SyncScope::new(
        ingestion.id,
        branch.id,
        sync.user.clone(),
        sync.tag_names(),
    );

    // The branch connection is the only write scope for the whole run.
    let branch_conn = branch::connect(&state.config.database_url, &branch).await?;
    let result = sync_all_types(state, &client, sync, rules, &branch_conn, &scope, logger).await;

    // Teardown runs on every path before the result is surfaced.
    if let Err(e) = branch_conn.close().await {
        tracing::warn!(error = %e, "Failed to close branch connection");
    }
    result
}

async fn sync_all_types(
    state: &AppState,
    client: &ForwardClient,
    sync: &syncs::Model,
    rules: &TransformRuleSet,
    branch_conn: &DatabaseConnection,
    scope: &SyncScope,
    logger: &mut SyncLogging,
) -> AppResult<()> {
    let engine = TransformEngine::new();
    let mut resolver = ReferenceResolver::new();

    for kind in EntityKind::NQE_SEQUENCE {
        if !sync.type_enabled(kind.short_name()) {
            logger.log_info(format!(
                "Skipping `{}` - disabled for this sync.",
                kind.model_key()
            ));
            continue;
        }
        let Some(spec) = rules.spec(kind) else {
            logger.log_info(format!(
                "Skipping `{}` - no transform map configured.",
                kind.model_key()
            ));
            continue;
        };

        let query_id = sync
            .query_override(kind.model_key())
            .unwrap_or_else(|| kind.default_query_id().to_string());
        let records = client
            .collect_nqe_records(&query_id, state.config.nqe_page_size)
            .await?;
        logger.log_info(format!(
            "Collected {} records for `{}`.",
            records.len(),
            kind.model_key()
        ));
        logger.init_statistics(kind.short_name(), records.len() as u64);

        for record in &records {
            // Each record runs in its own transaction; a bad record rolls
            // back alone and never aborts the batch.
            let txn = branch_conn.begin().await?;
            match process_record(&txn, &engine, &mut resolver, spec, kind, record, scope).await {
                Ok((result, rendered)) => {
                    txn.commit().await?;
                    cache_upserted(&mut resolver, kind, &rendered, &result);
                    logger.increment_statistics(kind.short_name());
                }
                Err((PipelineError::Record(err), rendered)) => {
                    if let Err(e) = txn.rollback().await {
                        tracing::warn!(error = %e, "Failed to roll back record transaction");
                    }
                    logger.log_failure(err.to_string());
                    tracing::debug!(model = kind.model_key(), error = %err, "Record skipped");
                    record_issue(
                        &state.db,
                        scope.ingestion_id,
                        kind,
                        &err,
                        record,
                        rendered.as_ref(),
                    )
                    .await?;
                }
                Err((PipelineError::Db(e), _)) => {
                    if let Err(rollback) = txn.rollback().await {
                        tracing::warn!(error = %rollback, "Failed to roll back record transaction");
                    }
                    return Err(AppError::Database(e));
                }
            }
        }
    }

    Ok(())
}

type RecordFailure = (PipelineError, Option<Rendered>);

async fn process_record<C: ConnectionTrait>(
    conn: &C,
    engine: &TransformEngine,
    resolver: &mut ReferenceResolver,
    spec: &TransformSpec,
    kind: EntityKind,
    record: &Value,
    scope: &SyncScope,
) -> Result<(UpsertResult, Rendered), RecordFailure> {
    let mut rendered = engine
        .render(kind, spec, record)
        .map_err(|e| (PipelineError::Record(e), None))?;

    // Resolve relationship references in declaration order so a location
    // can use the site resolved just before it.
    let references = std::mem::take(&mut rendered.relationships);
    for reference in references {
        let resolved = match &reference.reference {
            None => None,
            Some(value) => {
                let site = rendered.relation_id("site_id");
                let id = resolver
                    .resolve(conn, reference.kind, value, site, record)
                    .await
                    .map_err(|e| (e, Some(rendered.clone())))?;
                Some(id)
            }
        };
        rendered.set_relation(&reference.target_field, reference.coalesce, resolved);
    }

    let upserter = Upserter::new(conn, scope);
    let result = upserter
        .apply(kind, &rendered)
        .await
        .map_err(|e| (e, Some(rendered.clone())))?;
    Ok((result, rendered))
}

/// Write-through: make entities created in this run resolvable by later
/// records without a store round trip.
fn cache_upserted(
    resolver: &mut ReferenceResolver,
    kind: EntityKind,
    rendered: &Rendered,
    result: &UpsertResult,
) {
    let key = match kind {
        EntityKind::Device => rendered_str(rendered, "name"),
        EntityKind::Interface => None,
        _ => rendered_str(rendered, "slug").or_else(|| rendered_str(rendered, "name")),
    };
    if let Some(key) = key {
        let site = rendered.relation_id("site_id");
        resolver.cache(kind, &key, result.id, site);
    }
}

fn rendered_str(rendered: &Rendered, field: &str) -> Option<String> {
    if let Some(LookupValue::Eq(FieldValue::Str(s))) = rendered.lookup.get(field) {
        return Some(s.clone());
    }
    if let Some(FieldValue::Str(s)) = rendered.defaults.get(field) {
        return Some(s.clone());
    }
    None
}

/// Persist a record-level failure for operator review. Issues live on the
/// main connection so they are visible without merging the branch.
async fn record_issue(
    db: &DatabaseConnection,
    ingestion_id: Uuid,
    kind: EntityKind,
    err: &RecordError,
    record: &Value,
    rendered: Option<&Rendered>,
) -> AppResult<()> {
    let empty = Value::Object(serde_json::Map::new());
    let issue = ingestion_issues::ActiveModel {
        id: Set(Uuid::new_v4()),
        ingestion_id: Set(ingestion_id),
        timestamp: Set(Utc::now().into()),
        model: Set(Some(kind.model_key().to_string())),
        message: Set(err.to_string()),
        raw_data: Set(err.raw_record().cloned().unwrap_or_else(|| record.clone())),
        coalesce_fields: Set(rendered.map(Rendered::coalesce_json).unwrap_or_else(|| empty.clone())),
        defaults: Set(rendered.map(Rendered::defaults_json).unwrap_or(empty)),
        exception: Set(err.kind_name().to_string()),
    };
    issue.insert(db).await?;
    Ok(())
}

/// Merge one staged ingestion into the live schema. Enqueued either
/// automatically after a completed run or by an operator.
///
/// # Errors
///
/// Returns the merge error after the sync status has been updated. A
/// failed merge never reverts a completed sync retroactively; the status
/// reflects the merge attempt itself.
pub async fn run_merge(state: &AppState, ingestion_id: Uuid) -> AppResult<()> {
    let db = &state.db;
    let ingestion = ingestions::Entity::find_by_id(ingestion_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Sync(format!("Ingestion {ingestion_id} not found.")))?;
    let sync = syncs::Entity::find_by_id(ingestion.sync_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Sync("Ingestion references a missing sync.".to_string()))?;
    let branch_id = ingestion
        .branch_id
        .ok_or_else(|| AppError::Sync("Ingestion has no branch to merge.".to_string()))?;
    let branch = branch::refresh(db, branch_id).await?;

    let claimed = syncs::Entity::update_many()
        .col_expr(
            syncs::Column::Status,
            Expr::value(SyncStatus::Syncing.as_str()),
        )
        .filter(syncs::Column::Id.eq(sync.id))
        .filter(syncs::Column::Status.ne(SyncStatus::Syncing.as_str()))
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(AppError::MutualExclusion(
            "merge already in progress.".to_string(),
        ));
    }

    let branch_conn = branch::connect(&state.config.database_url, &branch).await?;
    let result = branch::merge(db, &branch_conn, &branch).await;
    if let Err(e) = branch_conn.close().await {
        tracing::warn!(error = %e, "Failed to close branch connection");
    }

    let status = match &result {
        Ok(applied) => {
            tracing::info!(branch = %branch.name, applied, "Merge completed");
            SyncStatus::Completed
        }
        Err(e) => {
            tracing::error!(branch = %branch.name, error = %e, "Merge failed");
            SyncStatus::Failed
        }
    };
    syncs::Entity::update_many()
        .col_expr(syncs::Column::Status, Expr::value(status.as_str()))
        .col_expr(syncs::Column::LastSynced, Expr::value(Utc::now()))
        .filter(syncs::Column::Id.eq(sync.id))
        .exec(db)
        .await?;

    result.map(|_| ())
}
