//! Upsert behavior on a mock store: idempotence, diff-then-write, create
//! path, tag application.
//!
//! Run with: cargo test --test upsert_test

use chrono::Utc;
use forward_db::entity::{manufacturers, object_changes};
use forward_db::sync::context::SyncScope;
use forward_db::sync::kinds::EntityKind;
use forward_db::sync::transform::{FieldValue, LookupValue, Rendered};
use forward_db::sync::upsert::{UpsertOutcome, Upserter};
use sea_orm::{DatabaseBackend, MockDatabase};
use serde_json::json;
use uuid::Uuid;

fn cisco(id: Uuid, description: &str, tags: serde_json::Value) -> manufacturers::Model {
    manufacturers::Model {
        id,
        name: "Cisco".to_string(),
        slug: "cisco".to_string(),
        description: Some(description.to_string()),
        tags,
    }
}

fn rendered_cisco(description: &str) -> Rendered {
    let mut rendered = Rendered::default();
    rendered.lookup.insert(
        "slug".to_string(),
        LookupValue::Eq(FieldValue::Str("cisco".to_string())),
    );
    rendered
        .defaults
        .insert("name".to_string(), FieldValue::Str("Cisco".to_string()));
    rendered.defaults.insert(
        "description".to_string(),
        FieldValue::Str(description.to_string()),
    );
    rendered
}

fn change_row(object_id: Uuid, action: &str) -> object_changes::Model {
    object_changes::Model {
        id: Uuid::new_v4(),
        time: Utc::now().into(),
        user: None,
        action: action.to_string(),
        object_type: "dcim.manufacturer".to_string(),
        object_id,
        prechange: None,
        postchange: Some(json!({})),
    }
}

fn scope_without_tags() -> SyncScope {
    SyncScope::new(Uuid::new_v4(), Uuid::new_v4(), None, Vec::new())
}

#[tokio::test]
async fn unchanged_records_perform_zero_writes() {
    let id = Uuid::new_v4();
    let model = cisco(id, "Networking vendor", json!([]));

    // Two identical runs: each only needs the SELECT result.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![model.clone()], vec![model.clone()]])
        .into_connection();

    let scope = scope_without_tags();
    let upserter = Upserter::new(&db, &scope);
    let rendered = rendered_cisco("Networking vendor");

    let first = upserter
        .apply(EntityKind::Manufacturer, &rendered)
        .await
        .unwrap();
    let second = upserter
        .apply(EntityKind::Manufacturer, &rendered)
        .await
        .unwrap();
    assert_eq!(first.outcome, UpsertOutcome::Unchanged);
    assert_eq!(second.outcome, UpsertOutcome::Unchanged);
    assert_eq!(first.id, id);

    // Two SELECTs, not a single write.
    let log = db.into_transaction_log();
    assert_eq!(log.len(), 2);
    for statement in &log {
        assert!(format!("{statement:?}").contains("SELECT"));
    }
}

#[tokio::test]
async fn changed_default_updates_only_that_field() {
    let id = Uuid::new_v4();
    let before = cisco(id, "old text", json!([]));
    let after = cisco(id, "new text", json!([]));

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![before]])
        .append_query_results([vec![after]])
        .append_query_results([vec![change_row(id, "update")]])
        .into_connection();

    let scope = scope_without_tags();
    let upserter = Upserter::new(&db, &scope);
    let result = upserter
        .apply(EntityKind::Manufacturer, &rendered_cisco("new text"))
        .await
        .unwrap();
    assert_eq!(result.outcome, UpsertOutcome::Updated);

    let log = db.into_transaction_log();
    assert_eq!(log.len(), 3);
    let update = format!("{:?}", log[1]);
    assert!(update.contains("UPDATE"));
    assert!(update.contains("description"));
    // The untouched identity column is not part of the UPDATE
    assert!(!update.contains("slug"));
    let journal = format!("{:?}", log[2]);
    assert!(journal.contains("object_changes"));
}

#[tokio::test]
async fn missing_record_is_created_with_lookup_and_defaults_merged() {
    let id = Uuid::new_v4();
    let created = cisco(id, "Networking vendor", json!([]));

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<manufacturers::Model>::new()])
        .append_query_results([vec![created]])
        .append_query_results([vec![change_row(id, "create")]])
        .into_connection();

    let scope = scope_without_tags();
    let upserter = Upserter::new(&db, &scope);
    let result = upserter
        .apply(EntityKind::Manufacturer, &rendered_cisco("Networking vendor"))
        .await
        .unwrap();
    assert_eq!(result.outcome, UpsertOutcome::Created);

    let log = db.into_transaction_log();
    assert_eq!(log.len(), 3);
    let insert = format!("{:?}", log[1]);
    assert!(insert.contains("INSERT"));
    assert!(insert.contains("manufacturers"));
    assert!(insert.contains("slug"));
    assert!(insert.contains("name"));
}

#[tokio::test]
async fn validation_failure_surfaces_before_any_write() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<manufacturers::Model>::new()])
        .into_connection();

    let scope = scope_without_tags();
    let upserter = Upserter::new(&db, &scope);

    // No name: the create must fail validation after the lookup, with no
    // INSERT attempted.
    let mut rendered = Rendered::default();
    rendered.lookup.insert(
        "slug".to_string(),
        LookupValue::Eq(FieldValue::Str("cisco".to_string())),
    );
    let err = upserter
        .apply(EntityKind::Manufacturer, &rendered)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        forward_db::error::PipelineError::Record(
            forward_db::error::RecordError::MissingField { field: "name", .. }
        )
    ));

    let log = db.into_transaction_log();
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn tag_union_writes_once_then_stays_idempotent() {
    let id = Uuid::new_v4();
    let untagged = cisco(id, "Networking vendor", json!([]));
    let tagged = cisco(id, "Networking vendor", json!(["forward-sync"]));

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        // First run: select, tag update (returning), change journal insert
        .append_query_results([vec![untagged]])
        .append_query_results([vec![tagged.clone()]])
        .append_query_results([vec![change_row(id, "update")]])
        // Second run: select only, the union is already present
        .append_query_results([vec![tagged]])
        .into_connection();

    let scope = SyncScope::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        None,
        vec!["forward-sync".to_string()],
    );
    let upserter = Upserter::new(&db, &scope);
    let rendered = rendered_cisco("Networking vendor");

    let first = upserter
        .apply(EntityKind::Manufacturer, &rendered)
        .await
        .unwrap();
    assert_eq!(first.outcome, UpsertOutcome::Unchanged);

    let second = upserter
        .apply(EntityKind::Manufacturer, &rendered)
        .await
        .unwrap();
    assert_eq!(second.outcome, UpsertOutcome::Unchanged);

    let log = db.into_transaction_log();
    assert_eq!(log.len(), 4);
    assert!(format!("{:?}", log[1]).contains("tags"));
}
