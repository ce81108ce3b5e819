use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "syncs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub snapshot_id: Uuid,
    pub parameters: Json,
    pub auto_merge: bool,
    pub tags: Json,
    pub scheduled: Option<DateTimeWithTimeZone>,
    pub interval_minutes: Option<i32>,
    pub user: Option<String>,
    pub status: String,
    pub last_synced: Option<DateTimeWithTimeZone>,
    pub created_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Tag names to propagate onto every synced entity.
    #[must_use]
    pub fn tag_names(&self) -> Vec<String> {
        self.tags
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Transform-map group ids selected in the sync parameters.
    #[must_use]
    pub fn group_ids(&self) -> Vec<Uuid> {
        self.parameters
            .get("groups")
            .and_then(|g| g.as_array())
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|g| g.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether an entity type is enabled for this sync. Absent keys default
    /// to enabled.
    #[must_use]
    pub fn type_enabled(&self, short_name: &str) -> bool {
        self.parameters
            .get(short_name)
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    /// Per-type NQE query id override from the sync parameters.
    #[must_use]
    pub fn query_override(&self, model_key: &str) -> Option<String> {
        self.parameters
            .get("queries")
            .and_then(|q| q.get(model_key))
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::snapshots::Entity",
        from = "Column::SnapshotId",
        to = "super::snapshots::Column::Id"
    )]
    Snapshot,
    #[sea_orm(has_many = "super::ingestions::Entity")]
    Ingestions,
}

impl Related<super::snapshots::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Snapshot.def()
    }
}

impl Related<super::ingestions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ingestions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
