use std::collections::BTreeMap;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "robot_components")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub group_id: i32,
    /// Robot part number; unique within its group and used as the trajectory table name
    pub label: String,
    pub risk_level: String,
    pub risk_source: Option<String>,
    pub last_evaluated_at: Option<ChronoDateTimeUtc>,
    /// Latest metric snapshot, JSON object of metric name to value
    pub metrics: String,
    pub reference: Option<String>,
    pub tech: Option<String>,
    pub mark: i32,
    pub remark: String,
    /// Bumped whenever cached trend charts of this component become stale
    pub chart_generation: i32,
    pub archived: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::robot_groups::Entity",
        from = "Column::GroupId",
        to = "super::robot_groups::Column::Id"
    )]
    RobotGroups,
    #[sea_orm(has_many = "super::risk_events::Entity")]
    RiskEvents,
    #[sea_orm(has_many = "super::trend_charts::Entity")]
    TrendCharts,
}

impl Related<super::robot_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RobotGroups.def()
    }
}

impl Related<super::risk_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RiskEvents.def()
    }
}

impl Related<super::trend_charts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TrendCharts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Normal,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Normal => "normal",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    /// Parse a level as written in weekly result files (`H`, `M`, `L`, `T`, `C`)
    /// or in API payloads (`high`, `medium`, `normal`, `low`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "h" | "high" => Some(RiskLevel::High),
            "m" | "medium" => Some(RiskLevel::Medium),
            "l" | "t" | "c" | "low" | "normal" => Some(RiskLevel::Normal),
            _ => None,
        }
    }
}

impl From<RiskLevel> for String {
    fn from(level: RiskLevel) -> Self {
        level.as_str().to_string()
    }
}

impl From<String> for RiskLevel {
    fn from(level: String) -> Self {
        RiskLevel::parse(&level).unwrap_or(RiskLevel::Normal)
    }
}

/// Writer that asserted a component's current risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSource {
    Check,
    Import,
    Manual,
}

impl RiskSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskSource::Check => "check",
            RiskSource::Import => "import",
            RiskSource::Manual => "manual",
        }
    }
}

impl From<RiskSource> for String {
    fn from(source: RiskSource) -> Self {
        source.as_str().to_string()
    }
}

pub type MetricSnapshot = BTreeMap<String, f64>;

impl Model {
    pub fn get_risk_level(&self) -> RiskLevel {
        RiskLevel::from(self.risk_level.clone())
    }

    pub fn is_high_risk(&self) -> bool {
        self.get_risk_level() == RiskLevel::High
    }

    pub fn metric_snapshot(&self) -> MetricSnapshot {
        serde_json::from_str(&self.metrics).unwrap_or_default()
    }
}
