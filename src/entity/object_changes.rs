use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Change journal row written inside a branch schema for every staged
/// create or update. Replayed in order when the branch is merged.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "object_changes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub time: DateTimeWithTimeZone,
    pub user: Option<String>,
    pub action: String,
    pub object_type: String,
    pub object_id: Uuid,
    pub prechange: Option<Json>,
    pub postchange: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
