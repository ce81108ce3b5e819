use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use sea_orm::sea_query::ColumnType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, Set,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::entity::{
    device_roles, device_types, devices, interfaces, locations, manufacturers, object_changes,
    sites,
};
use crate::error::{PipelineError, RecordError};
use crate::sync::context::SyncScope;
use crate::sync::kinds::EntityKind;
use crate::sync::transform::{FieldValue, LookupValue, Rendered};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy)]
pub struct UpsertResult {
    pub id: Uuid,
    pub outcome: UpsertOutcome,
}

/// Applies rendered records to the branch-scoped store: fetch by lookup,
/// diff, write only when something changed, journal every write.
pub struct Upserter<'a, C: ConnectionTrait> {
    conn: &'a C,
    scope: &'a SyncScope,
}

impl<'a, C: ConnectionTrait> Upserter<'a, C> {
    #[must_use]
    pub fn new(conn: &'a C, scope: &'a SyncScope) -> Self {
        Self { conn, scope }
    }

    /// Upsert one rendered record into the entity type it targets.
    ///
    /// # Errors
    ///
    /// `PipelineError::Record` on validation failure, `PipelineError::Db`
    /// on store failure.
    pub async fn apply(
        &self,
        kind: EntityKind,
        rendered: &Rendered,
    ) -> Result<UpsertResult, PipelineError> {
        match kind {
            EntityKind::Manufacturer => self.upsert::<manufacturers::Entity>(kind, rendered).await,
            EntityKind::DeviceRole => self.upsert::<device_roles::Entity>(kind, rendered).await,
            EntityKind::DeviceType => self.upsert::<device_types::Entity>(kind, rendered).await,
            EntityKind::Site => self.upsert::<sites::Entity>(kind, rendered).await,
            EntityKind::Location => self.upsert::<locations::Entity>(kind, rendered).await,
            EntityKind::Device => self.upsert::<devices::Entity>(kind, rendered).await,
            EntityKind::Interface => self.upsert::<interfaces::Entity>(kind, rendered).await,
        }
    }

    async fn upsert<E>(
        &self,
        kind: EntityKind,
        rendered: &Rendered,
    ) -> Result<UpsertResult, PipelineError>
    where
        E: EntityTrait,
        E::Model: serde::Serialize + IntoActiveModel<E::ActiveModel> + Send + Sync,
        E::ActiveModel: ActiveModelTrait<Entity = E> + sea_orm::ActiveModelBehavior + Send,
        E::Column: FromStr,
    {
        let condition = lookup_condition::<E>(kind, &rendered.lookup)?;
        let existing = E::find().filter(condition).one(self.conn).await?;

        match existing {
            Some(model) => self.update_existing::<E>(kind, rendered, model).await,
            None => self.create_new::<E>(kind, rendered).await,
        }
    }

    async fn update_existing<E>(
        &self,
        kind: EntityKind,
        rendered: &Rendered,
        model: E::Model,
    ) -> Result<UpsertResult, PipelineError>
    where
        E: EntityTrait,
        E::Model: serde::Serialize + IntoActiveModel<E::ActiveModel> + Send + Sync,
        E::ActiveModel: ActiveModelTrait<Entity = E> + sea_orm::ActiveModelBehavior + Send,
        E::Column: FromStr,
    {
        // Snapshot before mutating so the change journal can diff.
        let pre = to_json(&model)?;
        let id = model_id(&pre)?;

        let mut changes: Vec<(E::Column, sea_orm::Value)> = Vec::new();
        let mut merged = pre.clone();
        for (field, value) in &rendered.defaults {
            let current = pre.get(field.as_str()).cloned().unwrap_or(Value::Null);
            let next = value.to_json();
            if current == next {
                continue;
            }
            let column = column::<E>(kind, field)?;
            let sea_value = sea_value_for(value, column.def().get_column_type());
            changes.push((column, sea_value));
            merged[field.as_str()] = next;
        }

        let (outcome, current) = if changes.is_empty() {
            (UpsertOutcome::Unchanged, model)
        } else {
            validate_entity(kind, &merged)?;
            let mut active = model.into_active_model();
            for (column, value) in changes {
                active.set(column, value);
            }
            let updated = active.update(self.conn).await?;
            let post = to_json(&updated)?;
            self.record_change(kind, id, "update", Some(pre), Some(post))
                .await?;
            (UpsertOutcome::Updated, updated)
        };

        self.apply_tags::<E>(kind, current).await?;
        Ok(UpsertResult { id, outcome })
    }

    async fn create_new<E>(
        &self,
        kind: EntityKind,
        rendered: &Rendered,
    ) -> Result<UpsertResult, PipelineError>
    where
        E: EntityTrait,
        E::Model: serde::Serialize + IntoActiveModel<E::ActiveModel> + Send + Sync,
        E::ActiveModel: ActiveModelTrait<Entity = E> + sea_orm::ActiveModelBehavior + Send,
        E::Column: FromStr,
    {
        // IS NULL lookup predicates become plain null fields on create.
        let mut fields: BTreeMap<&str, FieldValue> = BTreeMap::new();
        for (field, value) in &rendered.lookup {
            let plain = match value {
                LookupValue::IsNull => FieldValue::Null,
                LookupValue::Eq(v) => v.clone(),
            };
            fields.insert(field.as_str(), plain);
        }
        for (field, value) in &rendered.defaults {
            fields.insert(field.as_str(), value.clone());
        }

        let id = Uuid::new_v4();
        let mut merged = serde_json::Map::new();
        merged.insert("id".to_string(), Value::String(id.to_string()));
        for (field, value) in &fields {
            merged.insert((*field).to_string(), value.to_json());
        }
        merged.insert("tags".to_string(), json!(self.scope.tags));
        validate_entity(kind, &Value::Object(merged))?;

        let mut active = <E::ActiveModel as ActiveModelTrait>::default();
        active.set(column::<E>(kind, "id")?, id.into());
        for (field, value) in &fields {
            let column = column::<E>(kind, field)?;
            let sea_value = sea_value_for(value, column.def().get_column_type());
            active.set(column, sea_value);
        }
        active.set(
            column::<E>(kind, "tags")?,
            sea_orm::Value::Json(Some(Box::new(json!(self.scope.tags)))),
        );

        let inserted = active.insert(self.conn).await?;
        let post = to_json(&inserted)?;
        self.record_change(kind, id, "create", None, Some(post)).await?;

        Ok(UpsertResult {
            id,
            outcome: UpsertOutcome::Created,
        })
    }

    /// Merge the run's tag set into the entity's tags. Snapshots first and
    /// writes only when the union differs, so unchanged reruns stay
    /// write-free.
    async fn apply_tags<E>(&self, kind: EntityKind, model: E::Model) -> Result<(), PipelineError>
    where
        E: EntityTrait,
        E::Model: serde::Serialize + IntoActiveModel<E::ActiveModel> + Send + Sync,
        E::ActiveModel: ActiveModelTrait<Entity = E> + sea_orm::ActiveModelBehavior + Send,
        E::Column: FromStr,
    {
        if self.scope.tags.is_empty() {
            return Ok(());
        }
        let pre = to_json(&model)?;
        let current: Vec<String> = pre
            .get("tags")
            .and_then(|t| t.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut union = current.clone();
        for tag in &self.scope.tags {
            if !union.contains(tag) {
                union.push(tag.clone());
            }
        }
        if union == current {
            return Ok(());
        }

        let id = model_id(&pre)?;
        let mut active = model.into_active_model();
        active.set(
            column::<E>(kind, "tags")?,
            sea_orm::Value::Json(Some(Box::new(json!(union)))),
        );
        let updated = active.update(self.conn).await?;
        let post = to_json(&updated)?;
        self.record_change(kind, id, "update", Some(pre), Some(post))
            .await?;
        Ok(())
    }

    async fn record_change(
        &self,
        kind: EntityKind,
        object_id: Uuid,
        action: &str,
        prechange: Option<Value>,
        postchange: Option<Value>,
    ) -> Result<(), DbErr> {
        let row = object_changes::ActiveModel {
            id: Set(Uuid::new_v4()),
            time: Set(Utc::now().into()),
            user: Set(self.scope.user.clone()),
            action: Set(action.to_string()),
            object_type: Set(kind.model_key().to_string()),
            object_id: Set(object_id),
            prechange: Set(prechange),
            postchange: Set(postchange),
        };
        row.insert(self.conn).await?;
        Ok(())
    }
}

fn lookup_condition<E>(
    kind: EntityKind,
    lookup: &BTreeMap<String, LookupValue>,
) -> Result<Condition, RecordError>
where
    E: EntityTrait,
    E::Column: FromStr,
{
    let mut condition = Condition::all();
    for (field, value) in lookup {
        let column = column::<E>(kind, field)?;
        condition = match value {
            LookupValue::IsNull => condition.add(column.is_null()),
            LookupValue::Eq(v) => {
                condition.add(column.eq(sea_value_for(v, column.def().get_column_type())))
            }
        };
    }
    Ok(condition)
}

fn column<E>(kind: EntityKind, field: &str) -> Result<E::Column, RecordError>
where
    E: EntityTrait,
    E::Column: FromStr,
{
    E::Column::from_str(field).map_err(|_| RecordError::Validation {
        model: kind.model_key(),
        message: format!("Unknown target field `{field}`."),
    })
}

/// Bind a field value with the column's type so nulls and integers arrive
/// correctly typed at the database.
fn sea_value_for(value: &FieldValue, column_type: &ColumnType) -> sea_orm::Value {
    match value {
        FieldValue::Null => match column_type {
            ColumnType::Integer | ColumnType::TinyInteger => sea_orm::Value::Int(None),
            ColumnType::SmallInteger => sea_orm::Value::SmallInt(None),
            ColumnType::BigInteger => sea_orm::Value::BigInt(None),
            ColumnType::Boolean => sea_orm::Value::Bool(None),
            ColumnType::Uuid => sea_orm::Value::Uuid(None),
            ColumnType::Json | ColumnType::JsonBinary => sea_orm::Value::Json(None),
            ColumnType::TimestampWithTimeZone => {
                sea_orm::Value::ChronoDateTimeWithTimeZone(None)
            }
            ColumnType::Float => sea_orm::Value::Float(None),
            ColumnType::Double => sea_orm::Value::Double(None),
            _ => sea_orm::Value::String(None),
        },
        FieldValue::Bool(b) => (*b).into(),
        FieldValue::Int(i) => match column_type {
            ColumnType::Integer => sea_orm::Value::Int(Some(*i as i32)),
            ColumnType::SmallInteger => sea_orm::Value::SmallInt(Some(*i as i16)),
            _ => (*i).into(),
        },
        FieldValue::Str(s) => s.clone().into(),
        FieldValue::Json(v) => sea_orm::Value::Json(Some(Box::new(v.clone()))),
        FieldValue::Entity(id) => (*id).into(),
    }
}

fn to_json<T: serde::Serialize>(model: &T) -> Result<Value, PipelineError> {
    serde_json::to_value(model)
        .map_err(|e| PipelineError::Db(DbErr::Custom(format!("Failed to snapshot entity: {e}"))))
}

fn model_id(snapshot: &Value) -> Result<Uuid, PipelineError> {
    snapshot
        .get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| {
            PipelineError::Db(DbErr::Custom(
                "Entity snapshot is missing a usable id.".to_string(),
            ))
        })
}

/// Model validation mirroring what the UI layer would enforce: required
/// fields present, slugs well-formed, numeric ranges sane.
pub fn validate_entity(kind: EntityKind, data: &Value) -> Result<(), RecordError> {
    match kind {
        EntityKind::Manufacturer | EntityKind::DeviceRole | EntityKind::Site => {
            require_str(kind, data, "name")?;
            require_slug(kind, data, "slug")?;
        }
        EntityKind::DeviceType => {
            require_str(kind, data, "model")?;
            require_slug(kind, data, "slug")?;
            require_ref(kind, data, "manufacturer_id")?;
            if let Some(height) = data.get("u_height").and_then(|v| v.as_i64())
                && !(0..=100).contains(&height)
            {
                return Err(RecordError::Validation {
                    model: kind.model_key(),
                    message: format!("u_height {height} is out of range 0-100."),
                });
            }
        }
        EntityKind::Location => {
            require_str(kind, data, "name")?;
            require_slug(kind, data, "slug")?;
            require_ref(kind, data, "site_id")?;
        }
        EntityKind::Device => {
            require_str(kind, data, "name")?;
            require_ref(kind, data, "device_type_id")?;
            require_ref(kind, data, "role_id")?;
        }
        EntityKind::Interface => {
            require_str(kind, data, "name")?;
            require_ref(kind, data, "device_id")?;
            if let Some(mtu) = data.get("mtu").and_then(|v| v.as_i64())
                && !(1..=65536).contains(&mtu)
            {
                return Err(RecordError::Validation {
                    model: kind.model_key(),
                    message: format!("MTU {mtu} is out of range 1-65536."),
                });
            }
            if let Some(speed) = data.get("speed_kbps").and_then(|v| v.as_i64())
                && speed < 0
            {
                return Err(RecordError::Validation {
                    model: kind.model_key(),
                    message: format!("Speed {speed} must not be negative."),
                });
            }
        }
    }
    Ok(())
}

fn require_str(kind: EntityKind, data: &Value, field: &'static str) -> Result<(), RecordError> {
    match data.get(field).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => Ok(()),
        _ => Err(RecordError::MissingField {
            model: kind.model_key(),
            field,
            record: data.clone(),
        }),
    }
}

fn require_slug(kind: EntityKind, data: &Value, field: &'static str) -> Result<(), RecordError> {
    require_str(kind, data, field)?;
    let slug = data[field].as_str().unwrap_or_default();
    let well_formed = slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !well_formed {
        return Err(RecordError::Validation {
            model: kind.model_key(),
            message: format!("`{slug}` is not a valid slug."),
        });
    }
    Ok(())
}

fn require_ref(kind: EntityKind, data: &Value, field: &'static str) -> Result<(), RecordError> {
    let present = data
        .get(field)
        .and_then(|v| v.as_str())
        .is_some_and(|s| Uuid::parse_str(s).is_ok());
    if present {
        Ok(())
    } else {
        Err(RecordError::MissingField {
            model: kind.model_key(),
            field,
            record: data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_requires_identity_fields() {
        let ok = json!({"name": "Cisco", "slug": "cisco"});
        assert!(validate_entity(EntityKind::Manufacturer, &ok).is_ok());

        let missing = json!({"slug": "cisco"});
        let err = validate_entity(EntityKind::Manufacturer, &missing).unwrap_err();
        assert!(matches!(
            err,
            RecordError::MissingField { field: "name", .. }
        ));

        let bad_slug = json!({"name": "Cisco", "slug": "not a slug"});
        let err = validate_entity(EntityKind::Manufacturer, &bad_slug).unwrap_err();
        assert!(matches!(err, RecordError::Validation { .. }));
    }

    #[test]
    fn interface_numeric_ranges_are_checked() {
        let device = Uuid::new_v4().to_string();
        let ok = json!({"name": "eth0", "device_id": device, "mtu": 9216});
        assert!(validate_entity(EntityKind::Interface, &ok).is_ok());

        let bad = json!({"name": "eth0", "device_id": device, "mtu": 0});
        assert!(validate_entity(EntityKind::Interface, &bad).is_err());
    }

    #[test]
    fn null_bindings_follow_the_column_type() {
        assert_eq!(
            sea_value_for(&FieldValue::Null, &ColumnType::Integer),
            sea_orm::Value::Int(None)
        );
        assert_eq!(
            sea_value_for(&FieldValue::Null, &ColumnType::Uuid),
            sea_orm::Value::Uuid(None)
        );
        assert_eq!(
            sea_value_for(&FieldValue::Int(9000), &ColumnType::Integer),
            sea_orm::Value::Int(Some(9000))
        );
        assert_eq!(
            sea_value_for(&FieldValue::Int(10_000_000), &ColumnType::BigInteger),
            sea_orm::Value::BigInt(Some(10_000_000))
        );
    }
}
