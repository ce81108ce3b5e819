use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A device interface. Names are unique per device.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "interfaces")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub device_id: Uuid,
    pub name: String,
    pub if_type: Option<String>,
    pub enabled: Option<bool>,
    pub mtu: Option<i32>,
    pub mac_address: Option<String>,
    pub speed_kbps: Option<i64>,
    pub description: Option<String>,
    pub tags: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::devices::Entity",
        from = "Column::DeviceId",
        to = "super::devices::Column::Id"
    )]
    Device,
}

impl Related<super::devices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
