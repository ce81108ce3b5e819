use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One source attribute → target attribute mapping. `coalesce` marks the
/// field as part of the identity lookup rather than a mutable default.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transform_fields")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub map_id: Uuid,
    pub source_field: String,
    pub target_field: String,
    pub coalesce: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub template: Option<String>,
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
