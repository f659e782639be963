use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only ledger entry written when a component enters high risk
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "high_risk_histories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub component_id: i32,
    pub group_id: i32,
    pub label: String,
    pub previous_level: String,
    pub entered_at: ChronoDateTimeUtc,
    pub source: String,
    pub source_ref: Option<String>,
    pub actor: Option<String>,
    pub metrics: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
