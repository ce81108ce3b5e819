use std::collections::BTreeMap;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde_json::Value;
use uuid::Uuid;

use crate::entity::{relationship_fields, transform_fields, transform_maps};
use crate::error::{AppError, AppResult, RecordError};
use crate::sync::kinds::EntityKind;

/// A value produced by rendering one transform field, after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Json(Value),
    Entity(Uuid),
}

impl FieldValue {
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Json(Value::Number(n)),
            },
            Value::String(s) => Self::Str(s),
            other => Self::Json(other),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::Entity(id) => Value::String(id.to_string()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A lookup predicate: either an equality on a rendered value or an
/// explicit IS NULL test. Null identity fields must stay expressible as a
/// query predicate, not collapse into a missing key.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupValue {
    IsNull,
    Eq(FieldValue),
}

/// A rendered relationship reference, not yet resolved to an entity.
#[derive(Debug, Clone)]
pub struct RenderedRef {
    pub kind: EntityKind,
    pub target_field: String,
    pub coalesce: bool,
    /// `None` when the template rendered to an explicit null.
    pub reference: Option<Value>,
}

/// Output of rendering one external record for one target entity type:
/// the identity lookup set, the mutable defaults, and any relationship
/// references still awaiting resolution.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub lookup: BTreeMap<String, LookupValue>,
    pub defaults: BTreeMap<String, FieldValue>,
    pub relationships: Vec<RenderedRef>,
}

impl Rendered {
    /// Fold a resolved relationship into the lookup or defaults set.
    pub fn set_relation(&mut self, target_field: &str, coalesce: bool, value: Option<Uuid>) {
        if coalesce {
            let entry = match value {
                Some(id) => LookupValue::Eq(FieldValue::Entity(id)),
                None => LookupValue::IsNull,
            };
            self.lookup.insert(target_field.to_string(), entry);
        } else {
            let entry = value.map(FieldValue::Entity).unwrap_or(FieldValue::Null);
            self.defaults.insert(target_field.to_string(), entry);
        }
    }

    /// Lookup set serialized for an ingestion issue, with IS NULL
    /// predicates spelled `field__isnull`.
    #[must_use]
    pub fn coalesce_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (field, value) in &self.lookup {
            match value {
                LookupValue::IsNull => {
                    map.insert(format!("{field}__isnull"), Value::Bool(true));
                }
                LookupValue::Eq(v) => {
                    map.insert(field.clone(), v.to_json());
                }
            }
        }
        Value::Object(map)
    }

    #[must_use]
    pub fn defaults_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (field, value) in &self.defaults {
            map.insert(field.clone(), value.to_json());
        }
        Value::Object(map)
    }

    /// Resolved FK stored under `field`, from either set.
    #[must_use]
    pub fn relation_id(&self, field: &str) -> Option<Uuid> {
        if let Some(LookupValue::Eq(FieldValue::Entity(id))) = self.lookup.get(field) {
            return Some(*id);
        }
        if let Some(FieldValue::Entity(id)) = self.defaults.get(field) {
            return Some(*id);
        }
        None
    }
}

/// One field mapping rule.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub source_field: String,
    pub target_field: String,
    pub coalesce: bool,
    pub template: Option<String>,
}

/// One relationship mapping rule.
#[derive(Debug, Clone)]
pub struct RelationshipRule {
    pub source_kind: EntityKind,
    pub target_field: String,
    pub coalesce: bool,
    pub template: String,
}

/// The mapping for one (source_model, target entity type) pair.
#[derive(Debug, Clone)]
pub struct TransformSpec {
    pub source_model: String,
    pub fields: Vec<FieldRule>,
    pub relationships: Vec<RelationshipRule>,
}

/// The transform maps in effect for one run, indexed by target entity
/// type. Built once per ingestion; never cached across runs, so mapping
/// edits take effect on the next run.
#[derive(Debug, Default)]
pub struct TransformRuleSet {
    specs: BTreeMap<EntityKind, TransformSpec>,
}

impl TransformRuleSet {
    /// Load the effective maps: group-less defaults first, then each
    /// selected group replacing the default for its target models, in the
    /// given group order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` on query failure.
    pub async fn load(db: &DatabaseConnection, group_ids: &[Uuid]) -> AppResult<Self> {
        let defaults = transform_maps::Entity::find()
            .filter(transform_maps::Column::GroupId.is_null())
            .order_by_asc(transform_maps::Column::Id)
            .all(db)
            .await?;

        let mut group_maps = Vec::with_capacity(group_ids.len());
        for group_id in group_ids {
            group_maps.push(
                transform_maps::Entity::find()
                    .filter(transform_maps::Column::GroupId.eq(*group_id))
                    .order_by_asc(transform_maps::Column::Id)
                    .all(db)
                    .await?,
            );
        }

        let selected = select_maps(defaults, group_maps);

        let mut specs = BTreeMap::new();
        for (kind, map) in selected {
            let fields = transform_fields::Entity::find()
                .filter(transform_fields::Column::MapId.eq(map.id))
                .order_by_asc(transform_fields::Column::Id)
                .all(db)
                .await?
                .into_iter()
                .map(|f| FieldRule {
                    source_field: f.source_field,
                    target_field: f.target_field,
                    coalesce: f.coalesce,
                    template: f.template.filter(|t| !t.trim().is_empty()),
                })
                .collect();

            let relationships = relationship_fields::Entity::find()
                .filter(relationship_fields::Column::MapId.eq(map.id))
                .order_by_asc(relationship_fields::Column::Id)
                .all(db)
                .await?
                .into_iter()
                .filter_map(|r| {
                    let Some(source_kind) = EntityKind::parse(&r.source_kind) else {
                        tracing::warn!(
                            source_kind = %r.source_kind,
                            target_field = %r.target_field,
                            "Skipping relationship field with unknown source kind"
                        );
                        return None;
                    };
                    Some(RelationshipRule {
                        source_kind,
                        target_field: r.target_field,
                        coalesce: r.coalesce,
                        template: r.template,
                    })
                })
                .collect();

            specs.insert(
                kind,
                TransformSpec {
                    source_model: map.source_model,
                    fields,
                    relationships,
                },
            );
        }

        Ok(Self { specs })
    }

    #[must_use]
    pub fn from_specs(specs: BTreeMap<EntityKind, TransformSpec>) -> Self {
        Self { specs }
    }

    #[must_use]
    pub fn spec(&self, kind: EntityKind) -> Option<&TransformSpec> {
        self.specs.get(&kind)
    }

    /// Prerequisite types of the enabled set that no transform map covers.
    /// Non-empty means the sync must fail validation before any API call.
    #[must_use]
    pub fn missing_prerequisites(&self, enabled: &[EntityKind]) -> Vec<EntityKind> {
        let mut missing = Vec::new();
        for kind in enabled {
            if !self.specs.contains_key(kind) {
                continue;
            }
            for prereq in kind.prerequisites() {
                if !self.specs.contains_key(prereq) && !missing.contains(prereq) {
                    missing.push(*prereq);
                }
            }
        }
        missing.sort();
        missing
    }
}

/// Group override precedence: start from the group-less defaults, then let
/// each group's maps replace the default for their target model, in group
/// order.
fn select_maps(
    defaults: Vec<transform_maps::Model>,
    group_maps: Vec<Vec<transform_maps::Model>>,
) -> BTreeMap<EntityKind, transform_maps::Model> {
    let mut selected = BTreeMap::new();
    for map in defaults {
        match EntityKind::parse(&map.target_model) {
            Some(kind) => {
                selected.insert(kind, map);
            }
            None => {
                tracing::warn!(target_model = %map.target_model, "Skipping transform map with unknown target model");
            }
        }
    }
    for maps in group_maps {
        for map in maps {
            if let Some(kind) = EntityKind::parse(&map.target_model) {
                selected.insert(kind, map);
            }
        }
    }
    selected
}

/// Refuse a second transform map for the same (group, target model) pair.
/// Enforced when maps are defined, never at render time; the migration
/// carries a matching unique index.
///
/// # Errors
///
/// Returns `AppError::Sync` when a duplicate exists, `AppError::Database`
/// on query failure.
pub async fn validate_unique_map(
    db: &DatabaseConnection,
    group_id: Option<Uuid>,
    target_model: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let mut query = transform_maps::Entity::find()
        .filter(transform_maps::Column::TargetModel.eq(target_model));
    query = match group_id {
        Some(id) => query.filter(transform_maps::Column::GroupId.eq(id)),
        None => query.filter(transform_maps::Column::GroupId.is_null()),
    };
    if let Some(id) = exclude {
        query = query.filter(transform_maps::Column::Id.ne(id));
    }
    if query.one(db).await?.is_some() {
        return Err(AppError::Sync(
            "A transform map with this group and target model already exists.".to_string(),
        ));
    }
    Ok(())
}

/// Evaluates transform maps against external records. The template
/// environment is restricted: no loaders, no host access; templates only
/// see the record under `object` plus the declared source field.
pub struct TransformEngine {
    env: minijinja::Environment<'static>,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformEngine {
    #[must_use]
    pub fn new() -> Self {
        let env = minijinja::Environment::new();
        Self { env }
    }

    /// Render one record through one transform spec.
    ///
    /// # Errors
    ///
    /// Returns a record-level error on template failure or a value that
    /// cannot be coerced to the target attribute type.
    pub fn render(
        &self,
        kind: EntityKind,
        spec: &TransformSpec,
        record: &Value,
    ) -> Result<Rendered, RecordError> {
        let mut out = Rendered::default();

        for rule in &spec.fields {
            let raw = match &rule.template {
                Some(template) => {
                    let text = self
                        .render_template(template, record, Some(&rule.source_field))
                        .map_err(|e| RecordError::Template {
                            model: kind.model_key(),
                            field: rule.target_field.clone(),
                            message: e.to_string(),
                        })?;
                    Value::String(text)
                }
                None => record
                    .get(&rule.source_field)
                    .cloned()
                    .unwrap_or(Value::Null),
            };

            let value = coerce_value(kind, &rule.target_field, raw)?;
            if rule.coalesce {
                let entry = if value.is_null() {
                    LookupValue::IsNull
                } else {
                    LookupValue::Eq(value)
                };
                out.lookup.insert(rule.target_field.clone(), entry);
            } else {
                out.defaults.insert(rule.target_field.clone(), value);
            }
        }

        for rule in &spec.relationships {
            let text = self
                .render_template(&rule.template, record, None)
                .map_err(|e| RecordError::Template {
                    model: kind.model_key(),
                    field: rule.target_field.clone(),
                    message: e.to_string(),
                })?;

            if text.is_empty() {
                continue;
            }
            let reference = if text.eq_ignore_ascii_case("none") {
                None
            } else if let Ok(pk) = text.parse::<i64>() {
                Some(Value::from(pk))
            } else {
                Some(Value::String(text))
            };
            out.relationships.push(RenderedRef {
                kind: rule.source_kind,
                target_field: rule.target_field.clone(),
                coalesce: rule.coalesce,
                reference,
            });
        }

        Ok(out)
    }

    fn render_template(
        &self,
        template: &str,
        record: &Value,
        source_field: Option<&str>,
    ) -> Result<String, minijinja::Error> {
        let mut context: BTreeMap<String, Value> = BTreeMap::new();
        context.insert("object".to_string(), record.clone());
        if let Some(field) = source_field {
            context.insert(
                field.to_string(),
                record.get(field).cloned().unwrap_or(Value::Null),
            );
        }
        let text = self.env.render_str(template, &context)?;
        Ok(text.trim().to_string())
    }
}

/// Coercion policy applied to every resolved value before classification:
/// the literal strings "true"/"false"/"none" become bool/null, and a
/// non-empty string aimed at an integer attribute is parsed.
fn coerce_value(
    kind: EntityKind,
    target_field: &str,
    raw: Value,
) -> Result<FieldValue, RecordError> {
    let Value::String(text) = raw else {
        return Ok(FieldValue::from_json(raw));
    };

    if text.eq_ignore_ascii_case("true") {
        return Ok(FieldValue::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Ok(FieldValue::Bool(false));
    }
    if text.eq_ignore_ascii_case("none") {
        return Ok(FieldValue::Null);
    }

    if !text.is_empty() && kind.integer_fields().contains(&target_field) {
        return text.trim().parse::<i64>().map(FieldValue::Int).map_err(|_| {
            RecordError::Validation {
                model: kind.model_key(),
                message: format!("Cannot coerce `{text}` into integer field `{target_field}`."),
            }
        });
    }

    Ok(FieldValue::Str(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(fields: Vec<FieldRule>, relationships: Vec<RelationshipRule>) -> TransformSpec {
        TransformSpec {
            source_model: "device".to_string(),
            fields,
            relationships,
        }
    }

    fn field(source: &str, target: &str, coalesce: bool, template: Option<&str>) -> FieldRule {
        FieldRule {
            source_field: source.to_string(),
            target_field: target.to_string(),
            coalesce,
            template: template.map(ToString::to_string),
        }
    }

    #[test]
    fn coalesce_and_defaults_split() {
        let engine = TransformEngine::new();
        let spec = spec(
            vec![
                field("name", "name", true, None),
                field("serial", "serial", false, None),
            ],
            vec![],
        );
        let rendered = engine
            .render(
                EntityKind::Device,
                &spec,
                &json!({"name": "core-sw-01", "serial": "FDO1234"}),
            )
            .unwrap();

        assert_eq!(
            rendered.lookup.get("name"),
            Some(&LookupValue::Eq(FieldValue::Str("core-sw-01".into())))
        );
        assert_eq!(
            rendered.defaults.get("serial"),
            Some(&FieldValue::Str("FDO1234".into()))
        );
    }

    #[test]
    fn null_coalesce_value_becomes_isnull_predicate() {
        let engine = TransformEngine::new();
        let spec = spec(vec![field("asset", "asset_tag", true, None)], vec![]);
        let rendered = engine
            .render(EntityKind::Device, &spec, &json!({"name": "x"}))
            .unwrap();
        assert_eq!(rendered.lookup.get("asset_tag"), Some(&LookupValue::IsNull));
        assert_eq!(
            rendered.coalesce_json(),
            json!({"asset_tag__isnull": true})
        );
    }

    #[test]
    fn literal_strings_coerce_to_bool_and_null() {
        let engine = TransformEngine::new();
        let spec = spec(
            vec![
                field("enabled", "enabled", false, None),
                field("shutdown", "shutdown", false, None),
                field("desc", "description", false, None),
            ],
            vec![],
        );
        let rendered = engine
            .render(
                EntityKind::Interface,
                &spec,
                &json!({"enabled": "True", "shutdown": "FALSE", "desc": "None"}),
            )
            .unwrap();
        assert_eq!(rendered.defaults.get("enabled"), Some(&FieldValue::Bool(true)));
        assert_eq!(rendered.defaults.get("shutdown"), Some(&FieldValue::Bool(false)));
        assert_eq!(rendered.defaults.get("description"), Some(&FieldValue::Null));
    }

    #[test]
    fn integer_target_fields_parse_strings() {
        let engine = TransformEngine::new();
        let spec = spec(vec![field("mtu", "mtu", false, None)], vec![]);
        let rendered = engine
            .render(EntityKind::Interface, &spec, &json!({"mtu": "9216"}))
            .unwrap();
        assert_eq!(rendered.defaults.get("mtu"), Some(&FieldValue::Int(9216)));

        let err = engine
            .render(EntityKind::Interface, &spec, &json!({"mtu": "jumbo"}))
            .unwrap_err();
        assert!(matches!(err, RecordError::Validation { .. }));
    }

    #[test]
    fn templates_render_against_the_record() {
        let engine = TransformEngine::new();
        let spec = spec(
            vec![field(
                "vendor",
                "slug",
                true,
                Some("{{ object.vendor | lower }}"),
            )],
            vec![],
        );
        let rendered = engine
            .render(EntityKind::Manufacturer, &spec, &json!({"vendor": "CISCO"}))
            .unwrap();
        assert_eq!(
            rendered.lookup.get("slug"),
            Some(&LookupValue::Eq(FieldValue::Str("cisco".into())))
        );
    }

    #[test]
    fn relationship_templates_produce_unresolved_refs() {
        let engine = TransformEngine::new();
        let spec = spec(
            vec![],
            vec![RelationshipRule {
                source_kind: EntityKind::Site,
                target_field: "site_id".to_string(),
                coalesce: false,
                template: "{{ object.siteName }}".to_string(),
            }],
        );
        let rendered = engine
            .render(EntityKind::Device, &spec, &json!({"siteName": "fra1"}))
            .unwrap();
        assert_eq!(rendered.relationships.len(), 1);
        assert_eq!(
            rendered.relationships[0].reference,
            Some(json!("fra1"))
        );

        // An empty render drops the field entirely
        let empty = engine
            .render(EntityKind::Device, &spec, &json!({"siteName": ""}))
            .unwrap();
        assert!(empty.relationships.is_empty());
    }

    #[test]
    fn group_maps_override_defaults_per_target() {
        let default_map = |target: &str, name: &str| transform_maps::Model {
            id: Uuid::new_v4(),
            name: name.to_string(),
            source_model: "device".to_string(),
            target_model: target.to_string(),
            group_id: None,
        };
        let group_id = Uuid::new_v4();
        let mut group_map = default_map("dcim.device", "group device map");
        group_map.group_id = Some(group_id);

        let selected = select_maps(
            vec![
                default_map("dcim.device", "default device map"),
                default_map("dcim.interface", "default interface map"),
            ],
            vec![vec![group_map.clone()]],
        );

        assert_eq!(selected[&EntityKind::Device].name, "group device map");
        assert_eq!(
            selected[&EntityKind::Interface].name,
            "default interface map"
        );
    }

    #[tokio::test]
    async fn duplicate_map_for_group_and_target_is_rejected() {
        use sea_orm::{DatabaseBackend, MockDatabase};

        let existing = transform_maps::Model {
            id: Uuid::new_v4(),
            name: "default device map".to_string(),
            source_model: "device".to_string(),
            target_model: "dcim.device".to_string(),
            group_id: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing]])
            .append_query_results([Vec::<transform_maps::Model>::new()])
            .into_connection();

        let err = validate_unique_map(&db, None, "dcim.device", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        assert!(validate_unique_map(&db, None, "dcim.interface", None)
            .await
            .is_ok());
    }

    #[test]
    fn missing_prerequisites_are_reported() {
        let mut specs = BTreeMap::new();
        specs.insert(
            EntityKind::Device,
            TransformSpec {
                source_model: "device".to_string(),
                fields: vec![],
                relationships: vec![],
            },
        );
        let rules = TransformRuleSet::from_specs(specs);
        let missing = rules.missing_prerequisites(&[EntityKind::Device]);
        assert_eq!(
            missing,
            vec![
                EntityKind::Manufacturer,
                EntityKind::DeviceRole,
                EntityKind::DeviceType,
            ]
        );
    }
}
