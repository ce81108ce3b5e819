use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "snapshots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub source_id: Uuid,
    pub snapshot_id: String,
    pub name: String,
    pub data: Option<Json>,
    pub date: Option<DateTimeWithTimeZone>,
    pub status: String,
    pub created_at: Option<DateTimeWithTimeZone>,
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Site names recorded in the snapshot metadata, if any.
    #[must_use]
    pub fn sites(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get("sites"))
            .and_then(|s| s.as_array())
            .map(|sites| {
                sites
                    .iter()
                    .filter_map(|s| s.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sources::Entity",
        from = "Column::SourceId",
        to = "super::sources::Column::Id"
    )]
    Source,
    #[sea_orm(has_many = "super::syncs::Entity")]
    Syncs,
}

impl Related<super::sources::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Source.def()
    }
}

impl Related<super::syncs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Syncs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
