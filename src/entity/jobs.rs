use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A queued unit of background work. `data` receives the run log and
/// statistics payload once the job finishes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: String,
    pub object_id: Uuid,
    pub name: String,
    pub user: Option<String>,
    pub status: String,
    pub scheduled: Option<DateTimeWithTimeZone>,
    pub interval_minutes: Option<i32>,
    pub adhoc: bool,
    pub data: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,
    pub created_at: Option<DateTimeWithTimeZone>,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
