use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A schema-level copy-on-write scope for staged ingestion writes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "branches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub schema_name: String,
    pub status: String,
    pub user: Option<String>,
    pub created_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::ingestions::Entity")]
    Ingestion,
}

impl Related<super::ingestions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ingestion.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
