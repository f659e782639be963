use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "risk_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub component_id: i32,
    pub group_id: i32,
    pub kind: String,
    pub severity: String,
    pub status: String,
    pub score: f64,
    pub message: String,
    pub detected_at: ChronoDateTimeUtc,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<ChronoDateTimeUtc>,
    pub notes: String,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<ChronoDateTimeUtc>,
    pub resolution_note: Option<String>,
    pub archived: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::robot_components::Entity",
        from = "Column::ComponentId",
        to = "super::robot_components::Column::Id"
    )]
    RobotComponents,
    #[sea_orm(
        belongs_to = "super::robot_groups::Entity",
        from = "Column::GroupId",
        to = "super::robot_groups::Column::Id"
    )]
    RobotGroups,
}

impl Related<super::robot_components::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RobotComponents.def()
    }
}

impl Related<super::robot_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RobotGroups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Event lifecycle: `Open -> Acknowledged -> Resolved`, or `Open -> Resolved`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl EventStatus {
    pub const ALL: [EventStatus; 3] = [
        EventStatus::Open,
        EventStatus::Acknowledged,
        EventStatus::Resolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Open => "open",
            EventStatus::Acknowledged => "acknowledged",
            EventStatus::Resolved => "resolved",
        }
    }

    pub fn is_unresolved(self) -> bool {
        !matches!(self, EventStatus::Resolved)
    }
}

impl From<EventStatus> for String {
    fn from(status: EventStatus) -> Self {
        status.as_str().to_string()
    }
}

impl From<String> for EventStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "acknowledged" => EventStatus::Acknowledged,
            "resolved" => EventStatus::Resolved,
            _ => EventStatus::Open,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Severity from how far a score exceeds its threshold
    pub fn from_exceedance(score: f64, threshold: f64) -> Self {
        if threshold <= 0.0 {
            return Severity::Critical;
        }
        let ratio = score / threshold;
        if ratio >= 3.0 {
            Severity::Critical
        } else if ratio >= 2.0 {
            Severity::High
        } else if ratio >= 1.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

impl From<String> for Severity {
    fn from(severity: String) -> Self {
        match severity.as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TrajectoryViolation,
    ImportHighRisk,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TrajectoryViolation => "trajectory_violation",
            EventKind::ImportHighRisk => "import_high_risk",
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl Model {
    pub fn get_status(&self) -> EventStatus {
        EventStatus::from(self.status.clone())
    }

    pub fn get_severity(&self) -> Severity {
        Severity::from(self.severity.clone())
    }
}
