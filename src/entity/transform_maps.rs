use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Declares how one external record type maps onto one target entity
/// type. Group-less maps are the defaults; maps in a selected group
/// replace the default for their target model.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transform_maps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub source_model: String,
    pub target_model: String,
    pub group_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transform_map_groups::Entity",
        from = "Column::GroupId",
        to = "super::transform_map_groups::Column::Id"
    )]
    Group,
    #[sea_orm(has_many = "super::transform_fields::Entity")]
    FieldMaps,
    #[sea_orm(has_many = "super::relationship_fields::Entity")]
    RelationshipMaps,
}

impl Related<super::transform_map_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl Related<super::transform_fields::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FieldMaps.def()
    }
}

impl Related<super::relationship_fields::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RelationshipMaps.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
