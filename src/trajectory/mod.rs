//! Gripper critical-trajectory checks.
//!
//! A run walks the selected trajectory tables, scores every axis with a
//! [`ViolationScorer`] and writes one deduplicated `trajectory_violation`
//! event per violating table. Tables are independent: a failure is recorded
//! in the run's report and the run moves on.

pub mod config;
pub mod report;
pub mod scoring;
pub mod source;

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::{deadline_after, deadline_passed, TimeWindow};
use crate::config::TrajectoryConfig;
use crate::database::entities::risk_events::{EventKind, Severity};
use crate::database::entities::robot_components::{self, RiskLevel, RiskSource};
use crate::errors::{EngineError, EngineResult};
use crate::services::component_locks::ComponentLocks;
use crate::services::registry_service::{assert_risk_level, LevelAssertion, RegistryService};
use crate::services::risk_event_service::{
    dedup_window, record_detection, DetectionOutcome, DetectionRequest,
};

pub use config::{CheckConfig, TableSelection};
pub use report::{AxisFinding, CheckResult, RunStatus, TableReport, TableStatus};
pub use scoring::{AxisScore, ToleranceBandScorer, ViolationScorer};
pub use source::{CsvDirectorySource, MemoryTrajectorySource, TrajectorySample, TrajectorySource};

/// Risk level asserted for a violation of the given severity
pub fn level_for(severity: Severity) -> RiskLevel {
    match severity {
        Severity::Critical | Severity::High => RiskLevel::High,
        Severity::Medium | Severity::Low => RiskLevel::Medium,
    }
}

#[derive(Clone)]
pub struct CheckEngine {
    db: DatabaseConnection,
    locks: ComponentLocks,
    source: Arc<dyn TrajectorySource>,
    scorer: Arc<dyn ViolationScorer>,
    config: TrajectoryConfig,
}

impl CheckEngine {
    pub fn new(
        db: DatabaseConnection,
        locks: ComponentLocks,
        source: Arc<dyn TrajectorySource>,
        scorer: Arc<dyn ViolationScorer>,
        config: TrajectoryConfig,
    ) -> Self {
        Self {
            db,
            locks,
            source,
            scorer,
            config,
        }
    }

    /// Sorted table names, optionally narrowed by a case-insensitive substring
    pub async fn list_checkable_tables(&self, filter: Option<&str>) -> EngineResult<Vec<String>> {
        let mut tables = self.source.list_tables().await?;
        if let Some(needle) = filter.map(|f| f.trim().to_lowercase()).filter(|f| !f.is_empty()) {
            tables.retain(|t| t.to_lowercase().contains(&needle));
        }
        tables.sort();
        tables.dedup();
        Ok(tables)
    }

    pub fn config_template(&self) -> CheckConfig {
        CheckConfig::template(&self.config)
    }

    /// Run a check. The deadline is checked before each table; on expiry the
    /// tables already applied stay applied and `Timeout` is returned.
    pub async fn execute(&self, config: CheckConfig) -> EngineResult<CheckResult> {
        config.validate()?;
        let window = config.window(&self.config)?;
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let timeout = config.timeout_secs.unwrap_or(self.config.timeout_secs);
        let deadline = deadline_after(timeout);

        let (tables, mut reports) = self.select_tables(&config.tables).await?;
        info!(
            "[{}] Trajectory check started on {} tables{}",
            run_id,
            tables.len() + reports.len(),
            if config.dry_run { " (dry run)" } else { "" }
        );

        for table in tables {
            if deadline_passed(deadline) {
                warn!(
                    "[{}] Trajectory check timed out after {} tables",
                    run_id,
                    reports.len()
                );
                return Err(EngineError::Timeout {
                    operation: "execute",
                    completed: reports.len(),
                });
            }
            let report = match self.check_table(&run_id, &table, &config, &window).await {
                Ok(report) => report,
                Err(err) => {
                    warn!("[{}] Table {} failed: {}", run_id, table, err);
                    TableReport::failed(&table, err)
                }
            };
            debug!("[{}] Table {} -> {:?}", run_id, table, report.status);
            reports.push(report);
        }

        let mut result = CheckResult {
            run_id,
            status: RunStatus::Completed,
            dry_run: config.dry_run,
            window_start: window.since,
            window_end: window.until,
            started_at,
            finished_at: Utc::now(),
            tables_checked: reports.len(),
            tables_passed: 0,
            tables_with_violations: 0,
            tables_no_data: 0,
            tables_failed: 0,
            events_created: 0,
            events_refreshed: 0,
            tables: reports,
        };
        result.tables_passed = result.count(TableStatus::Passed);
        result.tables_with_violations = result.count(TableStatus::Violations);
        result.tables_no_data = result.count(TableStatus::NoData);
        result.tables_failed = result.count(TableStatus::Failed);
        result.events_created = result
            .tables
            .iter()
            .filter(|t| t.event_outcome == Some(DetectionOutcome::Created))
            .count();
        result.events_refreshed = result
            .tables
            .iter()
            .filter(|t| t.event_outcome == Some(DetectionOutcome::Refreshed))
            .count();
        if result.tables_failed > 0 {
            result.status = RunStatus::PartialFailure;
        }

        info!(
            "[{}] Trajectory check finished: {} passed, {} with violations, {} without data, {} failed",
            result.run_id,
            result.tables_passed,
            result.tables_with_violations,
            result.tables_no_data,
            result.tables_failed
        );
        Ok(result)
    }

    /// Canonical names of the tables to check, plus failure reports for
    /// requested tables the source does not know
    async fn select_tables(
        &self,
        selection: &TableSelection,
    ) -> EngineResult<(Vec<String>, Vec<TableReport>)> {
        let available = self.source.list_tables().await?;
        match selection {
            TableSelection::All => Ok((available, Vec::new())),
            TableSelection::Tables(requested) => {
                let mut tables: Vec<String> = Vec::new();
                let mut unknown = Vec::new();
                for name in requested.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                    match available.iter().find(|t| t.eq_ignore_ascii_case(name)) {
                        Some(table) if !tables.contains(table) => tables.push(table.clone()),
                        Some(_) => {}
                        None => unknown.push(TableReport::failed(
                            name,
                            EngineError::not_found("trajectory_table", name),
                        )),
                    }
                }
                Ok((tables, unknown))
            }
        }
    }

    async fn check_table(
        &self,
        run_id: &str,
        table: &str,
        config: &CheckConfig,
        window: &TimeWindow,
    ) -> EngineResult<TableReport> {
        let samples = self.source.fetch(table, window).await?;
        let fetched = samples.len();
        let samples = scoring::filter_key_paths(samples, &config.key_paths);
        if samples.is_empty() {
            let mut report = TableReport::new(table, TableStatus::NoData);
            report.samples = fetched;
            return Ok(report);
        }

        let scorer = self.scorer.clone();
        let (scores, cycles, sample_count) = tokio::task::spawn_blocking(move || {
            let cycles = scoring::group_cycles(&samples).len();
            (scorer.score(&samples), cycles, samples.len())
        })
        .await?;

        let findings: Vec<AxisFinding> = scores
            .into_iter()
            .map(|score| {
                let threshold = config.threshold_for(score.axis, self.config.default_threshold);
                let violated = score.score > threshold;
                AxisFinding {
                    axis: score.axis,
                    score: score.score,
                    threshold,
                    violated,
                    severity: violated.then(|| Severity::from_exceedance(score.score, threshold)),
                    worst_cycle: score.worst_cycle,
                    program: score.program,
                }
            })
            .collect();

        let mut report = TableReport::new(table, TableStatus::Passed);
        report.samples = sample_count;
        report.cycles = cycles;
        report.findings = findings;

        let worst = report
            .findings
            .iter()
            .filter(|f| f.violated)
            .max_by(|a, b| {
                a.severity
                    .cmp(&b.severity)
                    .then(a.score.total_cmp(&b.score))
            })
            .cloned();
        let Some(worst) = worst else {
            return Ok(report);
        };

        report.status = TableStatus::Violations;
        report.severity = worst.severity;

        let component = RegistryService::find_by_table(&self.db, table)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_component", table))?;
        report.component_id = Some(component.id);

        if config.dry_run {
            return Ok(report);
        }

        let severity = worst.severity.unwrap_or(Severity::Low);
        let message = violation_message(&report.findings);
        let (event_id, outcome) = self
            .apply_violation(run_id, component.id, severity, worst.score, message)
            .await?;
        report.event_id = Some(event_id);
        report.event_outcome = Some(outcome);
        Ok(report)
    }

    /// Dedup lookup and every write for one table, atomically
    async fn apply_violation(
        &self,
        run_id: &str,
        component_id: i32,
        severity: Severity,
        score: f64,
        message: String,
    ) -> EngineResult<(i32, DetectionOutcome)> {
        let _guard = self.locks.acquire(component_id).await;
        let txn = self.db.begin().await?;

        let component = robot_components::Entity::find_by_id(component_id)
            .one(&txn)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_component", component_id))?;

        let (event, outcome) = record_detection(
            &txn,
            &component,
            DetectionRequest {
                kind: EventKind::TrajectoryViolation,
                severity,
                score,
                message,
                dedup_window: self.dedup_window(),
            },
        )
        .await?;

        assert_risk_level(
            &txn,
            component,
            LevelAssertion {
                level: level_for(severity),
                source: RiskSource::Check,
                source_ref: Some(run_id.to_string()),
                actor: None,
                metrics: None,
            },
        )
        .await?;

        txn.commit().await?;
        Ok((event.id, outcome))
    }

    fn dedup_window(&self) -> Option<Duration> {
        dedup_window(self.config.dedup_window_secs)
    }
}

fn violation_message(findings: &[AxisFinding]) -> String {
    let parts: Vec<String> = findings
        .iter()
        .filter(|f| f.violated)
        .map(|f| format!("{} {:.3} > {:.3}", f.axis, f.score, f.threshold))
        .collect();
    format!("Trajectory current outside tolerance band: {}", parts.join(", "))
}
