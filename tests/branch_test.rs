//! Branch merge behavior on mock stores: journal replay, the ready-only
//! merge gate, and schema discard.
//!
//! Run with: cargo test --test branch_test

use chrono::Utc;
use forward_db::choices::BranchStatus;
use forward_db::entity::{branches, manufacturers, object_changes};
use forward_db::error::AppError;
use forward_db::sync::branch;
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use serde_json::json;
use uuid::Uuid;

fn branch_row(status: BranchStatus) -> branches::Model {
    branches::Model {
        id: Uuid::new_v4(),
        name: "Forward Sync 2026-08-01 02:00:00".to_string(),
        schema_name: "branch_0a1b2c3d".to_string(),
        status: status.as_str().to_string(),
        user: None,
        created_at: Some(Utc::now().into()),
    }
}

fn journal_entry(model: &manufacturers::Model, action: &str) -> object_changes::Model {
    object_changes::Model {
        id: Uuid::new_v4(),
        time: Utc::now().into(),
        user: None,
        action: action.to_string(),
        object_type: "dcim.manufacturer".to_string(),
        object_id: model.id,
        prechange: None,
        postchange: Some(serde_json::to_value(model).unwrap()),
    }
}

#[tokio::test]
async fn merge_replays_the_change_journal_in_order() {
    let created = manufacturers::Model {
        id: Uuid::new_v4(),
        name: "Arista".to_string(),
        slug: "arista".to_string(),
        description: None,
        tags: json!([]),
    };
    let mut updated = created.clone();
    updated.description = Some("EOS vendor".to_string());

    let exec_ok = MockExecResult {
        last_insert_id: 0,
        rows_affected: 1,
    };
    // Live connection: the ready->merging check-and-set, one upsert per
    // journal entry (insert..on conflict, returning the pk), then the
    // merged status update.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([exec_ok.clone(), exec_ok.clone()])
        .append_query_results([
            [maplit_id(created.id)],
            [maplit_id(updated.id)],
        ])
        .into_connection();
    // Branch connection: the journal read.
    let branch_conn = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![
            journal_entry(&created, "create"),
            journal_entry(&updated, "update"),
        ]])
        .into_connection();

    let branch = branch_row(BranchStatus::Ready);
    let applied = branch::merge(&db, &branch_conn, &branch).await.unwrap();
    assert_eq!(applied, 2);

    let log = db.into_transaction_log();
    let inserts: Vec<String> = log
        .iter()
        .map(|s| format!("{s:?}"))
        .filter(|s| s.contains("INSERT"))
        .collect();
    assert_eq!(inserts.len(), 2);
    for insert in &inserts {
        assert!(insert.contains("ON CONFLICT"));
        assert!(insert.contains("manufacturers"));
    }
}

fn maplit_id(id: Uuid) -> std::collections::BTreeMap<&'static str, sea_orm::Value> {
    let mut row = std::collections::BTreeMap::new();
    row.insert("id", sea_orm::Value::from(id));
    row
}

#[tokio::test]
async fn merge_refuses_a_branch_that_is_not_ready() {
    // The check-and-set matches zero rows for a failed branch.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        }])
        .into_connection();
    let branch_conn = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

    let branch = branch_row(BranchStatus::Failed);
    let err = branch::merge(&db, &branch_conn, &branch).await.unwrap_err();
    assert!(matches!(err, AppError::MutualExclusion(_)));
}

#[tokio::test]
async fn discard_drops_the_branch_schema() {
    let exec_ok = MockExecResult {
        last_insert_id: 0,
        rows_affected: 1,
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([exec_ok.clone(), exec_ok])
        .into_connection();

    let branch = branch_row(BranchStatus::Ready);
    branch::discard(&db, &branch).await.unwrap();

    let log = db.into_transaction_log();
    let all = format!("{log:?}");
    assert!(all.contains("DROP SCHEMA IF EXISTS"));
    assert!(all.contains("branch_0a1b2c3d"));
}
