//! Orchestrator gate behavior on a mock store: mutual exclusion and the
//! transform-map validation gate, both of which must reject a run before
//! any branch is created.
//!
//! Run with: cargo test --test runner_test

use chrono::Utc;
use forward_db::choices::SyncStatus;
use forward_db::common::AppState;
use forward_db::config::{Config, Deployment};
use forward_db::entity::{relationship_fields, snapshots, sources, syncs, transform_fields, transform_maps};
use forward_db::error::AppError;
use forward_db::sync::kinds::EntityKind;
use forward_db::sync::runner;
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use serde_json::json;
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/forward_db_test".to_string(),
        job_poll_interval_seconds: 5,
        snapshot_refresh_interval_seconds: 900,
        forward_default_timeout_seconds: 60,
        nqe_page_size: 1000,
        deployment: Deployment::Local,
    }
}

fn sync_row(id: Uuid, snapshot_id: Uuid) -> syncs::Model {
    syncs::Model {
        id,
        name: "nightly ingest".to_string(),
        snapshot_id,
        parameters: json!({}),
        auto_merge: false,
        tags: json!([]),
        scheduled: None,
        interval_minutes: None,
        user: None,
        status: SyncStatus::New.as_str().to_string(),
        last_synced: None,
        created_at: None,
    }
}

fn snapshot_row(id: Uuid, source_id: Uuid) -> snapshots::Model {
    snapshots::Model {
        id,
        source_id,
        snapshot_id: "42".to_string(),
        name: "nightly".to_string(),
        data: Some(json!({"sites": ["fra1"]})),
        date: Some(Utc::now().into()),
        status: "loaded".to_string(),
        created_at: None,
        updated_at: None,
    }
}

fn source_row(id: Uuid) -> sources::Model {
    sources::Model {
        id,
        name: "fwd-prod".to_string(),
        url: "https://fwd.example.com".to_string(),
        auth_token: Some("token-1".to_string()),
        verify_tls: true,
        timeout_secs: None,
        network_id: None,
        status: SyncStatus::Completed.as_str().to_string(),
        last_synced: None,
        created_at: None,
    }
}

fn map_row(target: EntityKind) -> transform_maps::Model {
    transform_maps::Model {
        id: Uuid::new_v4(),
        name: format!("default {} map", target.short_name()),
        source_model: target.short_name().to_string(),
        target_model: target.model_key().to_string(),
        group_id: None,
    }
}

#[tokio::test]
async fn concurrent_sync_is_rejected_without_creating_a_branch() {
    let sync_id = Uuid::new_v4();
    let snapshot_id = Uuid::new_v4();
    let source_id = Uuid::new_v4();

    let mut mock = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![sync_row(sync_id, snapshot_id)]])
        .append_query_results([vec![snapshot_row(snapshot_id, source_id)]])
        .append_query_results([vec![source_row(source_id)]])
        // Full default transform-map coverage so validation passes
        .append_query_results([EntityKind::NQE_SEQUENCE.map(map_row).to_vec()]);
    for _ in EntityKind::NQE_SEQUENCE {
        mock = mock
            .append_query_results([Vec::<transform_fields::Model>::new()])
            .append_query_results([Vec::<relationship_fields::Model>::new()]);
    }
    // The status check-and-set matches zero rows: someone else is syncing.
    let db = mock
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        }])
        .into_connection();

    let state = AppState::new(db, test_config());
    let err = runner::run_ingestion(&state, sync_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MutualExclusion(_)));

    // Nothing after the rejected check-and-set: no ingestion row and no
    // branch row were created.
    let log = state.db.into_transaction_log();
    for statement in &log {
        let sql = format!("{statement:?}");
        assert!(!sql.contains("ingestions"));
        assert!(!sql.contains("branches"));
    }
}

#[tokio::test]
async fn enqueue_sync_queues_snapshot_refresh_then_ingestion() {
    use forward_db::entity::jobs;
    use forward_db::sync::scheduler;

    let sync = sync_row(Uuid::new_v4(), Uuid::new_v4());
    let source_id = Uuid::new_v4();
    let job_row = |kind: &str, object_id: Uuid| jobs::Model {
        id: Uuid::new_v4(),
        kind: kind.to_string(),
        object_id,
        name: "queued job".to_string(),
        user: None,
        status: "pending".to_string(),
        scheduled: None,
        interval_minutes: None,
        adhoc: true,
        data: None,
        error: None,
        created_at: Some(Utc::now().into()),
        started_at: None,
        completed_at: None,
    };

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .append_query_results([vec![job_row("snapshot_sync", source_id)]])
        .append_query_results([vec![job_row("ingestion", sync.id)]])
        .into_connection();

    let job = scheduler::enqueue_sync(&db, &sync, source_id, true).await.unwrap();
    assert_eq!(job.kind, "ingestion");

    let log = db.into_transaction_log();
    let statements: Vec<String> = log.iter().map(|s| format!("{s:?}")).collect();
    assert!(statements[0].contains("UPDATE"));
    assert!(statements[0].contains("syncs"));
    assert_eq!(
        statements.iter().filter(|s| s.contains("INSERT")).count(),
        2
    );
}

#[tokio::test]
async fn validation_gate_fails_before_any_api_call_and_names_missing_types() {
    let sync_id = Uuid::new_v4();
    let snapshot_id = Uuid::new_v4();
    let source_id = Uuid::new_v4();

    let device_only = vec![map_row(EntityKind::Device)];
    let mut mock = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![sync_row(sync_id, snapshot_id)]])
        .append_query_results([vec![snapshot_row(snapshot_id, source_id)]])
        .append_query_results([vec![source_row(source_id)]])
        .append_query_results([device_only]);
    mock = mock
        .append_query_results([Vec::<transform_fields::Model>::new()])
        .append_query_results([Vec::<relationship_fields::Model>::new()]);
    let db = mock.into_connection();

    let state = AppState::new(db, test_config());
    let err = runner::run_ingestion(&state, sync_id, None)
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("Missing maps"));
    assert!(message.contains("dcim.manufacturer"));
    assert!(message.contains("dcim.devicerole"));
    assert!(message.contains("dcim.devicetype"));
}
