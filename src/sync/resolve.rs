use std::collections::HashMap;

use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde_json::Value;
use uuid::Uuid;

use crate::entity::{device_roles, device_types, devices, locations, manufacturers, sites};
use crate::error::{PipelineError, RecordError};
use crate::sync::kinds::EntityKind;
use crate::sync::slugify;

/// Case-insensitive equality on a text column.
fn lower_eq<C: ColumnTrait>(col: C, value: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(col))).eq(value.to_lowercase())
}

/// Slug and name extracted from a reference value. Composite objects
/// prefer an explicit slug and fall back to the slugified name; scalars
/// are tried as both.
fn reference_parts(value: &Value) -> (Option<String>, Option<String>) {
    match value {
        Value::Object(map) => {
            let name = map
                .get("name")
                .or_else(|| map.get("model"))
                .and_then(|v| v.as_str())
                .map(ToString::to_string);
            let slug = map
                .get("slug")
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
                .or_else(|| name.as_deref().map(slugify));
            (slug, name)
        }
        Value::String(s) if !s.is_empty() => (Some(s.clone()), Some(s.clone())),
        Value::Number(n) => {
            let s = n.to_string();
            (Some(s.clone()), Some(s))
        }
        _ => (None, None),
    }
}

/// Per-run reference caches. One resolver is owned by one sync run; the
/// cached ids belong to that run's branch and must never leak into
/// another ingestion.
#[derive(Debug, Default)]
pub struct ReferenceResolver {
    manufacturers: HashMap<String, Uuid>,
    roles: HashMap<String, Uuid>,
    device_types: HashMap<String, Uuid>,
    sites: HashMap<String, Uuid>,
    locations: HashMap<(Uuid, String), Uuid>,
    devices: HashMap<String, Uuid>,
}

impl ReferenceResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a reference of the given kind to an entity id. `site`
    /// scopes location lookups and is ignored for other kinds.
    ///
    /// # Errors
    ///
    /// `PipelineError::Record` with `ReferenceNotFound` when no match
    /// exists; `PipelineError::Db` on store failure.
    pub async fn resolve<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        kind: EntityKind,
        reference: &Value,
        site: Option<Uuid>,
        record: &Value,
    ) -> Result<Uuid, PipelineError> {
        match kind {
            EntityKind::Manufacturer => self.resolve_manufacturer(conn, reference, record).await,
            EntityKind::DeviceRole => self.resolve_role(conn, reference, record).await,
            EntityKind::DeviceType => self.resolve_device_type(conn, reference, record).await,
            EntityKind::Site => self.resolve_site(conn, reference, record).await,
            EntityKind::Location => self.resolve_location(conn, reference, site, record).await,
            EntityKind::Device => self.resolve_device(conn, reference, record).await,
            EntityKind::Interface => Err(PipelineError::Record(RecordError::Validation {
                model: kind.model_key(),
                message: "Interfaces cannot be referenced by other records.".to_string(),
            })),
        }
    }

    pub async fn resolve_manufacturer<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        reference: &Value,
        record: &Value,
    ) -> Result<Uuid, PipelineError> {
        let (slug, name) = reference_parts(reference);
        let identifier = required_identifier(
            &slug,
            &name,
            EntityKind::Manufacturer,
            reference,
            record,
        )?;
        if let Some(id) = self.manufacturers.get(&identifier) {
            return Ok(*id);
        }

        let mut found = None;
        if let Some(slug) = &slug {
            found = manufacturers::Entity::find()
                .filter(lower_eq(manufacturers::Column::Slug, slug))
                .one(conn)
                .await?;
        }
        if found.is_none()
            && let Some(name) = &name
        {
            found = manufacturers::Entity::find()
                .filter(lower_eq(manufacturers::Column::Name, name))
                .one(conn)
                .await?;
        }

        let model = found.ok_or_else(|| not_found(EntityKind::Manufacturer, reference, record))?;
        self.manufacturers.insert(identifier, model.id);
        Ok(model.id)
    }

    pub async fn resolve_role<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        reference: &Value,
        record: &Value,
    ) -> Result<Uuid, PipelineError> {
        let (slug, name) = reference_parts(reference);
        let identifier =
            required_identifier(&slug, &name, EntityKind::DeviceRole, reference, record)?;
        if let Some(id) = self.roles.get(&identifier) {
            return Ok(*id);
        }

        let mut found = None;
        if let Some(slug) = &slug {
            found = device_roles::Entity::find()
                .filter(lower_eq(device_roles::Column::Slug, slug))
                .one(conn)
                .await?;
        }
        if found.is_none()
            && let Some(name) = &name
        {
            found = device_roles::Entity::find()
                .filter(lower_eq(device_roles::Column::Name, name))
                .one(conn)
                .await?;
        }

        let model = found.ok_or_else(|| not_found(EntityKind::DeviceRole, reference, record))?;
        self.roles.insert(identifier, model.id);
        Ok(model.id)
    }

    /// Device types are addressed by slug only; composite references may
    /// carry the model name, which slugifies into one.
    pub async fn resolve_device_type<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        reference: &Value,
        record: &Value,
    ) -> Result<Uuid, PipelineError> {
        let (slug, _) = reference_parts(reference);
        let Some(slug) = slug else {
            return Err(missing_reference(EntityKind::DeviceType, record));
        };
        let identifier = slug.to_lowercase();
        if let Some(id) = self.device_types.get(&identifier) {
            return Ok(*id);
        }

        let found = device_types::Entity::find()
            .filter(lower_eq(device_types::Column::Slug, &slug))
            .one(conn)
            .await?;

        let model = found.ok_or_else(|| not_found(EntityKind::DeviceType, reference, record))?;
        self.device_types.insert(identifier, model.id);
        Ok(model.id)
    }

    pub async fn resolve_site<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        reference: &Value,
        record: &Value,
    ) -> Result<Uuid, PipelineError> {
        let (slug, name) = reference_parts(reference);
        let identifier = required_identifier(&slug, &name, EntityKind::Site, reference, record)?;
        if let Some(id) = self.sites.get(&identifier) {
            return Ok(*id);
        }

        let mut found = None;
        if let Some(slug) = &slug {
            found = sites::Entity::find()
                .filter(lower_eq(sites::Column::Slug, slug))
                .one(conn)
                .await?;
        }
        if found.is_none()
            && let Some(name) = &name
        {
            found = sites::Entity::find()
                .filter(lower_eq(sites::Column::Name, name))
                .one(conn)
                .await?;
        }

        let model = found.ok_or_else(|| not_found(EntityKind::Site, reference, record))?;
        self.sites.insert(identifier, model.id);
        Ok(model.id)
    }

    /// Locations are unique per site, so lookups carry the already
    /// resolved site and the cache key includes it.
    pub async fn resolve_location<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        reference: &Value,
        site: Option<Uuid>,
        record: &Value,
    ) -> Result<Uuid, PipelineError> {
        let Some(site) = site else {
            return Err(PipelineError::Record(RecordError::Validation {
                model: EntityKind::Location.model_key(),
                message: "Location reference requires a resolved site.".to_string(),
            }));
        };
        let (slug, name) = reference_parts(reference);
        let identifier =
            required_identifier(&slug, &name, EntityKind::Location, reference, record)?;
        let cache_key = (site, identifier);
        if let Some(id) = self.locations.get(&cache_key) {
            return Ok(*id);
        }

        let mut found = None;
        if let Some(slug) = &slug {
            found = locations::Entity::find()
                .filter(locations::Column::SiteId.eq(site))
                .filter(lower_eq(locations::Column::Slug, slug))
                .one(conn)
                .await?;
        }
        if found.is_none()
            && let Some(name) = &name
        {
            found = locations::Entity::find()
                .filter(locations::Column::SiteId.eq(site))
                .filter(lower_eq(locations::Column::Name, name))
                .one(conn)
                .await?;
        }

        let model = found.ok_or_else(|| not_found(EntityKind::Location, reference, record))?;
        self.locations.insert(cache_key, model.id);
        Ok(model.id)
    }

    pub async fn resolve_device<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        reference: &Value,
        record: &Value,
    ) -> Result<Uuid, PipelineError> {
        let name = match reference {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Object(map) => map
                .get("name")
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
                .ok_or_else(|| missing_reference(EntityKind::Device, record))?,
            _ => return Err(missing_reference(EntityKind::Device, record)),
        };
        let identifier = name.to_lowercase();
        if let Some(id) = self.devices.get(&identifier) {
            return Ok(*id);
        }

        let found = devices::Entity::find()
            .filter(lower_eq(devices::Column::Name, &name))
            .one(conn)
            .await?;

        let model = found.ok_or_else(|| not_found(EntityKind::Device, reference, record))?;
        self.devices.insert(identifier, model.id);
        Ok(model.id)
    }

    /// Write-through: record an entity the run itself just created so
    /// later records resolve it without a query.
    pub fn cache(&mut self, kind: EntityKind, key: &str, id: Uuid, site: Option<Uuid>) {
        let key = key.to_lowercase();
        match kind {
            EntityKind::Manufacturer => {
                self.manufacturers.insert(key, id);
            }
            EntityKind::DeviceRole => {
                self.roles.insert(key, id);
            }
            EntityKind::DeviceType => {
                self.device_types.insert(key, id);
            }
            EntityKind::Site => {
                self.sites.insert(key, id);
            }
            EntityKind::Location => {
                if let Some(site) = site {
                    self.locations.insert((site, key), id);
                }
            }
            EntityKind::Device => {
                self.devices.insert(key, id);
            }
            EntityKind::Interface => {}
        }
    }
}

fn required_identifier(
    slug: &Option<String>,
    name: &Option<String>,
    kind: EntityKind,
    _reference: &Value,
    record: &Value,
) -> Result<String, PipelineError> {
    slug.as_deref()
        .or(name.as_deref())
        .map(str::to_lowercase)
        .ok_or_else(|| missing_reference(kind, record))
}

fn missing_reference(kind: EntityKind, record: &Value) -> PipelineError {
    PipelineError::Record(RecordError::ReferenceNotFound {
        kind: kind.model_key(),
        reference: String::new(),
        record: record.clone(),
    })
}

fn not_found(kind: EntityKind, reference: &Value, record: &Value) -> PipelineError {
    let shown = match reference {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("slug")
            .or_else(|| map.get("name"))
            .or_else(|| map.get("model"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        other => other.to_string(),
    };
    PipelineError::Record(RecordError::ReferenceNotFound {
        kind: kind.model_key(),
        reference: shown,
        record: record.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reference_parts_prefer_slug_then_name() {
        let (slug, name) = reference_parts(&json!({"slug": "cisco", "name": "Cisco Systems"}));
        assert_eq!(slug.as_deref(), Some("cisco"));
        assert_eq!(name.as_deref(), Some("Cisco Systems"));

        // Name-only objects slugify the name
        let (slug, name) = reference_parts(&json!({"name": "Arista Networks"}));
        assert_eq!(slug.as_deref(), Some("arista-networks"));
        assert_eq!(name.as_deref(), Some("Arista Networks"));

        // Scalars are tried as both slug and name
        let (slug, name) = reference_parts(&json!("juniper"));
        assert_eq!(slug.as_deref(), Some("juniper"));
        assert_eq!(name.as_deref(), Some("juniper"));

        assert_eq!(reference_parts(&Value::Null), (None, None));
    }

    #[test]
    fn write_through_cache_is_keyed_per_site_for_locations() {
        let mut resolver = ReferenceResolver::new();
        let site_a = Uuid::new_v4();
        let site_b = Uuid::new_v4();
        let loc = Uuid::new_v4();

        resolver.cache(EntityKind::Location, "Row-1", loc, Some(site_a));
        assert_eq!(
            resolver.locations.get(&(site_a, "row-1".to_string())),
            Some(&loc)
        );
        assert!(resolver
            .locations
            .get(&(site_b, "row-1".to_string()))
            .is_none());
    }
}
