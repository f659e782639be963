use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "robot_groups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub key: String,
    pub name: String,
    pub expected_total: i32,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::robot_components::Entity")]
    RobotComponents,
    #[sea_orm(has_many = "super::risk_events::Entity")]
    RiskEvents,
}

impl Related<super::robot_components::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RobotComponents.def()
    }
}

impl Related<super::risk_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RiskEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
