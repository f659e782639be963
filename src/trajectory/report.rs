use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::common::Axis;
use crate::database::entities::risk_events::Severity;
use crate::services::risk_event_service::DetectionOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    PartialFailure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Passed,
    Violations,
    NoData,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct AxisFinding {
    pub axis: Axis,
    pub score: f64,
    pub threshold: f64,
    pub violated: bool,
    pub severity: Option<Severity>,
    pub worst_cycle: Option<String>,
    pub program: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TableReport {
    pub table: String,
    pub status: TableStatus,
    pub component_id: Option<i32>,
    pub samples: usize,
    pub cycles: usize,
    pub findings: Vec<AxisFinding>,
    pub severity: Option<Severity>,
    pub event_id: Option<i32>,
    pub event_outcome: Option<DetectionOutcome>,
    pub error: Option<String>,
}

impl TableReport {
    pub fn new(table: impl Into<String>, status: TableStatus) -> Self {
        Self {
            table: table.into(),
            status,
            component_id: None,
            samples: 0,
            cycles: 0,
            findings: Vec::new(),
            severity: None,
            event_id: None,
            event_outcome: None,
            error: None,
        }
    }

    pub fn failed(table: impl Into<String>, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(table, TableStatus::Failed)
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckResult {
    pub run_id: String,
    pub status: RunStatus,
    pub dry_run: bool,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables_checked: usize,
    pub tables_passed: usize,
    pub tables_with_violations: usize,
    pub tables_no_data: usize,
    pub tables_failed: usize,
    pub events_created: usize,
    pub events_refreshed: usize,
    pub tables: Vec<TableReport>,
}

impl CheckResult {
    pub fn count(&self, status: TableStatus) -> usize {
        self.tables.iter().filter(|t| t.status == status).count()
    }
}
