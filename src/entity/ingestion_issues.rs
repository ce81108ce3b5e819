use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Structured per-record failure diagnostic. Created during a run, never
/// updated, cascade-deleted with its ingestion.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ingestion_issues")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub ingestion_id: Uuid,
    pub timestamp: DateTimeWithTimeZone,
    pub model: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub raw_data: Json,
    pub coalesce_fields: Json,
    pub defaults: Json,
    pub exception: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ingestions::Entity",
        from = "Column::IngestionId",
        to = "super::ingestions::Column::Id"
    )]
    Ingestion,
}

impl Related<super::ingestions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ingestion.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
