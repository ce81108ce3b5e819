use chrono::Utc;
use sea_orm::sea_query::{Expr, Iden, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, IntoActiveModel, Iterable, PrimaryKeyToColumn, QueryFilter, QueryOrder, Set,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::choices::BranchStatus;
use crate::entity::{
    branches, device_roles, device_types, devices, interfaces, locations, manufacturers,
    object_changes, sites,
};
use crate::error::{AppError, AppResult};
use crate::sync::kinds::EntityKind;

/// Tables copied into every branch schema, in dependency order.
pub const INVENTORY_TABLES: &[&str] = &[
    "manufacturers",
    "device_roles",
    "device_types",
    "sites",
    "locations",
    "devices",
    "interfaces",
];

/// Create the branch record. The schema is not touched until
/// [`provision`] runs.
///
/// # Errors
///
/// Returns `AppError::Database` on store failure.
pub async fn create_branch(
    db: &DatabaseConnection,
    name: &str,
    user: Option<&str>,
) -> AppResult<branches::Model> {
    let id = Uuid::new_v4();
    let schema_name = format!("branch_{}", &id.simple().to_string()[..8]);
    let branch = branches::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        schema_name: Set(schema_name),
        status: Set(BranchStatus::New.as_str().to_string()),
        user: Set(user.map(ToString::to_string)),
        created_at: Set(Some(Utc::now().into())),
    };
    Ok(branch.insert(db).await?)
}

/// Provision the branch schema: create it and copy every inventory table
/// (structure and rows) from the live schema. The change journal starts
/// empty. Any failure marks the branch FAILED and aborts the run before a
/// single record is transferred.
///
/// # Errors
///
/// Returns `AppError::Provisioning` when schema creation fails.
pub async fn provision(db: &DatabaseConnection, branch: &branches::Model) -> AppResult<()> {
    set_status(db, branch.id, BranchStatus::Provisioning).await?;

    match provision_schema(db, &branch.schema_name).await {
        Ok(()) => {
            set_status(db, branch.id, BranchStatus::Ready).await?;
            tracing::info!(branch = %branch.name, schema = %branch.schema_name, "Branch provisioned");
            Ok(())
        }
        Err(e) => {
            set_status(db, branch.id, BranchStatus::Failed).await?;
            Err(AppError::Provisioning(e.to_string()))
        }
    }
}

async fn provision_schema(db: &DatabaseConnection, schema: &str) -> Result<(), sea_orm::DbErr> {
    db.execute_unprepared(&format!("CREATE SCHEMA \"{schema}\"")).await?;
    for table in INVENTORY_TABLES {
        db.execute_unprepared(&format!(
            "CREATE TABLE \"{schema}\".\"{table}\" (LIKE public.\"{table}\" INCLUDING ALL)"
        ))
        .await?;
        db.execute_unprepared(&format!(
            "INSERT INTO \"{schema}\".\"{table}\" SELECT * FROM public.\"{table}\""
        ))
        .await?;
    }
    // The journal is branch-local and starts empty.
    db.execute_unprepared(&format!(
        "CREATE TABLE \"{schema}\".\"object_changes\" (LIKE public.\"object_changes\" INCLUDING ALL)"
    ))
    .await?;
    Ok(())
}

/// Open the write scope for a branch: a dedicated connection whose search
/// path is the branch schema only. Every read and write of the run must go
/// through it; the default connection would bypass isolation.
///
/// # Errors
///
/// Returns `AppError::Database` when the connection cannot be opened.
pub async fn connect(database_url: &str, branch: &branches::Model) -> AppResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .set_schema_search_path(branch.schema_name.clone())
        .max_connections(2);
    Ok(Database::connect(options).await?)
}

pub async fn set_status(
    db: &DatabaseConnection,
    branch_id: Uuid,
    status: BranchStatus,
) -> AppResult<()> {
    branches::Entity::update_many()
        .col_expr(branches::Column::Status, Expr::value(status.as_str()))
        .filter(branches::Column::Id.eq(branch_id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn refresh(db: &DatabaseConnection, branch_id: Uuid) -> AppResult<branches::Model> {
    branches::Entity::find_by_id(branch_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Sync(format!("Branch {branch_id} no longer exists.")))
}

/// Merge a branch: replay its change journal onto the live schema in
/// journal order. Only a READY branch can merge; the transition is an
/// atomic check-and-set so two merge jobs cannot race.
///
/// # Errors
///
/// `AppError::MutualExclusion` when the branch is not ready,
/// `AppError::Database`/`AppError::Sync` when the replay fails.
pub async fn merge(
    db: &DatabaseConnection,
    branch_conn: &DatabaseConnection,
    branch: &branches::Model,
) -> AppResult<u64> {
    let claimed = branches::Entity::update_many()
        .col_expr(
            branches::Column::Status,
            Expr::value(BranchStatus::Merging.as_str()),
        )
        .filter(branches::Column::Id.eq(branch.id))
        .filter(branches::Column::Status.eq(BranchStatus::Ready.as_str()))
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(AppError::MutualExclusion(format!(
            "branch `{}` is not ready to merge.",
            branch.name
        )));
    }

    match replay_changes(db, branch_conn).await {
        Ok(applied) => {
            set_status(db, branch.id, BranchStatus::Merged).await?;
            tracing::info!(branch = %branch.name, applied, "Branch merged");
            Ok(applied)
        }
        Err(e) => {
            set_status(db, branch.id, BranchStatus::Failed).await?;
            Err(e)
        }
    }
}

/// Drop a branch schema and forget the branch. Used when an operator
/// discards a staged ingestion instead of merging it.
///
/// # Errors
///
/// Returns `AppError::Database` on store failure.
pub async fn discard(db: &DatabaseConnection, branch: &branches::Model) -> AppResult<()> {
    db.execute_unprepared(&format!(
        "DROP SCHEMA IF EXISTS \"{}\" CASCADE",
        branch.schema_name
    ))
    .await?;
    branches::Entity::delete_by_id(branch.id).exec(db).await?;
    Ok(())
}

async fn replay_changes(
    db: &DatabaseConnection,
    branch_conn: &DatabaseConnection,
) -> AppResult<u64> {
    let changes = object_changes::Entity::find()
        .order_by_asc(object_changes::Column::Time)
        .order_by_asc(object_changes::Column::Id)
        .all(branch_conn)
        .await?;

    let mut applied = 0u64;
    for change in changes {
        let Some(post) = change.postchange else {
            continue;
        };
        let Some(kind) = EntityKind::parse(&change.object_type) else {
            tracing::warn!(object_type = %change.object_type, "Skipping journal entry with unknown object type");
            continue;
        };
        match kind {
            EntityKind::Manufacturer => replay::<manufacturers::Entity>(db, post).await?,
            EntityKind::DeviceRole => replay::<device_roles::Entity>(db, post).await?,
            EntityKind::DeviceType => replay::<device_types::Entity>(db, post).await?,
            EntityKind::Site => replay::<sites::Entity>(db, post).await?,
            EntityKind::Location => replay::<locations::Entity>(db, post).await?,
            EntityKind::Device => replay::<devices::Entity>(db, post).await?,
            EntityKind::Interface => replay::<interfaces::Entity>(db, post).await?,
        }
        applied += 1;
    }
    Ok(applied)
}

/// Insert-on-conflict-update the post-change state of one journal entry.
/// Ingestion never deletes, so create/update coverage is total.
async fn replay<E>(db: &DatabaseConnection, post: Value) -> AppResult<()>
where
    E: EntityTrait,
    E::Model: DeserializeOwned + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + sea_orm::ActiveModelBehavior + Send,
{
    let model: E::Model = serde_json::from_value(post)
        .map_err(|e| AppError::Sync(format!("Malformed change journal entry: {e}")))?;

    let mut active = model.into_active_model();
    for column in E::Column::iter() {
        if let Some(value) = active.get(column).into_value() {
            active.set(column, value);
        }
    }

    let Some(pk) = E::PrimaryKey::iter().next().map(PrimaryKeyToColumn::into_column) else {
        return Err(AppError::Sync("Entity has no primary key.".to_string()));
    };
    let pk_name = Iden::to_string(&pk);
    let non_pk: Vec<E::Column> = E::Column::iter()
        .filter(|c| Iden::to_string(c) != pk_name)
        .collect();

    E::insert(active)
        .on_conflict(
            OnConflict::column(pk)
                .update_columns(non_pk)
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}
