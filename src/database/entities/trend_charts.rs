use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Cached trend chart; at most one row per `(component_id, axis)`
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trend_charts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub component_id: i32,
    pub axis: i32,
    pub generated_at: ChronoDateTimeUtc,
    pub content_type: String,
    pub payload: String,
    pub point_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::robot_components::Entity",
        from = "Column::ComponentId",
        to = "super::robot_components::Column::Id"
    )]
    RobotComponents,
}

impl Related<super::robot_components::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RobotComponents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
