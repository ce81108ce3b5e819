use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Like a transform field, but the rendered value names another entity
/// (by slug, name or id) which is resolved to a foreign key.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "relationship_fields")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub map_id: Uuid,
    pub source_kind: String,
    pub target_field: String,
    pub coalesce: bool,
    #[sea_orm(column_type = "Text")]
    pub template: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transform_maps::Entity",
        from = "Column::MapId",
        to = "super::transform_maps::Column::Id"
    )]
    TransformMap,
}

impl Related<super::transform_maps::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransformMap.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
