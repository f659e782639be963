use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use indexmap::IndexMap;
use sea_orm::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::common::{deadline_after, deadline_passed, Actor};
use crate::config::ImportConfig;
use crate::database::entities::risk_events::{EventKind, Severity};
use crate::database::entities::robot_components::{self, MetricSnapshot, RiskLevel, RiskSource};
use crate::errors::{EngineError, EngineResult};
use crate::services::component_locks::ComponentLocks;
use crate::services::legacy::LegacyEndpoint;
use crate::services::registry_service::{assert_risk_level, LevelAssertion, RegistryService};
use crate::services::risk_event_service::{record_detection, DetectionRequest};
use crate::trend::TrendChartCache;

const GROUP_COLUMNS: [&str; 2] = ["group", "shop"];
const LABEL_COLUMNS: [&str; 2] = ["label", "robot"];
/// Descriptive columns carried by weekly result files that are not metrics
const DESCRIPTIVE_COLUMNS: [&str; 4] = ["type", "type_spec", "number", "name"];

/// One parsed CSV row
#[derive(Clone, Debug, PartialEq)]
pub struct ImportRow {
    /// 1-based data row number (the header is row 0)
    pub row: usize,
    pub group_key: String,
    pub label: String,
    pub level: RiskLevel,
    pub mark: Option<i32>,
    pub remark: Option<String>,
    pub reference: Option<String>,
    pub tech: Option<String>,
    pub metrics: MetricSnapshot,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RowError {
    pub row: usize,
    pub group: Option<String>,
    pub label: Option<String>,
    pub kind: String,
    pub message: String,
}

impl RowError {
    fn new(row: usize, group: Option<String>, label: Option<String>, err: &EngineError) -> Self {
        Self {
            row,
            group,
            label,
            kind: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Rows of one uploaded CSV, in file order
#[derive(Clone, Debug)]
pub struct CsvImportBatch {
    pub source: String,
    pub rows: Vec<Result<ImportRow, RowError>>,
}

struct Columns {
    group: usize,
    label: usize,
    level: Option<usize>,
    mark: Option<usize>,
    remark: Option<usize>,
    reference: Option<usize>,
    tech: Option<usize>,
    metrics: Vec<(usize, String)>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> EngineResult<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let group = find(&GROUP_COLUMNS[..]).ok_or_else(|| {
            EngineError::Validation("CSV header has no 'group' or 'shop' column".to_string())
        })?;
        let label = find(&LABEL_COLUMNS[..]).ok_or_else(|| {
            EngineError::Validation("CSV header has no 'label' or 'robot' column".to_string())
        })?;
        let level = find(&["level"][..]);
        let mark = find(&["mark"][..]);
        let remark = find(&["remark"][..]);
        let reference = find(&["reference"][..]);
        let tech = find(&["tech"][..]);

        let known = [Some(group), Some(label), level, mark, remark, reference, tech];
        let metrics = headers
            .iter()
            .enumerate()
            .filter(|(idx, name)| {
                !known.contains(&Some(*idx))
                    && !name.trim().is_empty()
                    && !DESCRIPTIVE_COLUMNS
                        .iter()
                        .any(|d| name.trim().eq_ignore_ascii_case(d))
            })
            .map(|(idx, name)| (idx, name.trim().to_string()))
            .collect();

        Ok(Self {
            group,
            label,
            level,
            mark,
            remark,
            reference,
            tech,
            metrics,
        })
    }

    fn parse(&self, row: usize, record: &csv::StringRecord) -> Result<ImportRow, RowError> {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let group = cell(Some(self.group));
        let label = cell(Some(self.label));
        let fail = |message: String| {
            RowError::new(
                row,
                group.clone(),
                label.clone(),
                &EngineError::Validation(message),
            )
        };

        let group_key = group.clone().ok_or_else(|| fail("missing group key".to_string()))?;
        let label_value = label.clone().ok_or_else(|| fail("missing label".to_string()))?;
        let level_text = cell(self.level).ok_or_else(|| fail("missing level".to_string()))?;
        let level = RiskLevel::parse(&level_text)
            .ok_or_else(|| fail(format!("unknown level '{}'", level_text)))?;
        let mark = match cell(self.mark) {
            Some(text) => Some(
                text.parse::<f64>()
                    .map(|v| v as i32)
                    .map_err(|_| fail(format!("mark '{}' is not a number", text)))?,
            ),
            None => None,
        };

        let mut metrics = MetricSnapshot::new();
        for (idx, name) in &self.metrics {
            if let Some(text) = cell(Some(*idx)) {
                let value: f64 = text
                    .parse()
                    .map_err(|_| fail(format!("metric {} has non-numeric value '{}'", name, text)))?;
                metrics.insert(name.clone(), value);
            }
        }

        Ok(ImportRow {
            row,
            group_key,
            label: label_value,
            level,
            mark,
            remark: cell(self.remark),
            reference: cell(self.reference),
            tech: cell(self.tech),
            metrics,
        })
    }
}

impl CsvImportBatch {
    /// Parse a CSV document. A missing or unusable header rejects the whole
    /// batch; every other problem is recorded against its row.
    pub fn from_reader<R: Read>(source: impl Into<String>, reader: R) -> EngineResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| EngineError::Validation(format!("unreadable CSV header: {}", e)))?
            .clone();
        if headers.is_empty() {
            return Err(EngineError::Validation("CSV header row is empty".to_string()));
        }
        let columns = Columns::from_headers(&headers)?;

        let rows = reader
            .records()
            .enumerate()
            .map(|(idx, record)| {
                let row = idx + 1;
                match record {
                    Ok(record) => columns.parse(row, &record),
                    Err(err) => Err(RowError::new(
                        row,
                        None,
                        None,
                        &EngineError::Validation(format!("malformed CSV record: {}", err)),
                    )),
                }
            })
            .collect();

        Ok(Self {
            source: source.into(),
            rows,
        })
    }

    pub fn from_path(path: &Path) -> EngineResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            EngineError::Validation(format!("cannot open {}: {}", path.display(), e))
        })?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_reader(source, file)
    }

    /// Parse off the async runtime
    pub async fn parse(source: Option<String>, body: Vec<u8>) -> EngineResult<Self> {
        let source = source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(default_source_name);
        tokio::task::spawn_blocking(move || Self::from_reader(source, body.as_slice())).await?
    }
}

/// Name given to uploads that arrive without one
pub fn default_source_name() -> String {
    format!("upload-{}.csv", Utc::now().format("%Y%m%dT%H%M%S"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Completed,
    PartialFailure,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct GroupImportStats {
    pub updated: usize,
    pub failed: usize,
    pub high_risk_entered: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImportSummary {
    pub source: String,
    pub actor: String,
    pub status: ImportStatus,
    pub total_rows: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub high_risk_entered: usize,
    pub errors: Vec<RowError>,
    pub group_stats: BTreeMap<String, GroupImportStats>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

struct AppliedRow {
    group_key: String,
    entered_high: bool,
}

#[derive(Default)]
struct ChainOutcome {
    applied: Vec<AppliedRow>,
    failed: Vec<RowError>,
    timed_out: bool,
}

/// Bulk reconciliation of component state from CSV snapshots
#[derive(Clone)]
pub struct ImportService {
    db: DatabaseConnection,
    locks: ComponentLocks,
    config: ImportConfig,
    dedup_window: Option<Duration>,
}

impl ImportService {
    pub fn new(
        db: DatabaseConnection,
        locks: ComponentLocks,
        config: ImportConfig,
        dedup_window: Option<Duration>,
    ) -> Self {
        Self {
            db,
            locks,
            config,
            dedup_window,
        }
    }

    /// Apply every row of `batch` to the registry. Rows for one component
    /// apply in file order; different components proceed concurrently.
    /// `timeout_secs` overrides the configured budget for this batch.
    pub async fn import_components(
        &self,
        batch: CsvImportBatch,
        actor: &Actor,
        timeout_secs: Option<u64>,
    ) -> EngineResult<ImportSummary> {
        actor.require_admin("import components")?;

        let started_at = Utc::now();
        let deadline = deadline_after(timeout_secs.unwrap_or(self.config.timeout_secs));
        let total_rows = batch.rows.len();
        let source = batch.source.clone();
        info!(
            "Importing {} rows from {} for {}",
            total_rows, source, actor.name
        );

        let mut errors: Vec<RowError> = Vec::new();
        let mut chains: IndexMap<i32, Vec<ImportRow>> = IndexMap::new();
        let mut resolved: IndexMap<(String, String), Option<i32>> = IndexMap::new();

        for row in batch.rows {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    warn!("Row {} of {} rejected: {}", err.row, source, err.message);
                    errors.push(err);
                    continue;
                }
            };
            let key = (row.group_key.clone(), row.label.to_lowercase());
            let component_id = match resolved.get(&key) {
                Some(id) => *id,
                None => {
                    let id = RegistryService::resolve_component(&self.db, &row.group_key, &row.label)
                        .await?
                        .map(|c| c.id);
                    resolved.insert(key, id);
                    id
                }
            };
            match component_id {
                Some(id) => chains.entry(id).or_default().push(row),
                None => {
                    let err = EngineError::not_found(
                        "robot_component",
                        format!("{}/{}", row.group_key, row.label),
                    );
                    warn!("Row {} of {} rejected: {}", row.row, source, err);
                    errors.push(RowError::new(
                        row.row,
                        Some(row.group_key),
                        Some(row.label),
                        &err,
                    ));
                }
            }
        }

        let parallelism = self.config.parallelism.max(1);
        let outcomes: Vec<ChainOutcome> = stream::iter(chains)
            .map(|(component_id, rows)| {
                self.apply_chain(component_id, rows, deadline, actor, &source)
            })
            .buffer_unordered(parallelism)
            .collect()
            .await;

        let mut group_stats: BTreeMap<String, GroupImportStats> = BTreeMap::new();
        let mut succeeded = 0;
        let mut high_risk_entered = 0;
        let mut timed_out = false;
        for outcome in outcomes {
            timed_out |= outcome.timed_out;
            for applied in outcome.applied {
                succeeded += 1;
                let stats = group_stats.entry(applied.group_key).or_default();
                stats.updated += 1;
                if applied.entered_high {
                    high_risk_entered += 1;
                    stats.high_risk_entered += 1;
                }
            }
            errors.extend(outcome.failed);
        }

        if timed_out {
            warn!(
                "Import of {} timed out after {} applied rows",
                source, succeeded
            );
            return Err(EngineError::Timeout {
                operation: "import_components",
                completed: succeeded,
            });
        }

        for err in &errors {
            if let Some(group) = err.group.clone() {
                group_stats.entry(group).or_default().failed += 1;
            }
        }
        errors.sort_by_key(|e| e.row);

        let failed = errors.len();
        let summary = ImportSummary {
            source,
            actor: actor.name.clone(),
            status: if failed == 0 {
                ImportStatus::Completed
            } else {
                ImportStatus::PartialFailure
            },
            total_rows,
            succeeded,
            failed,
            high_risk_entered,
            errors,
            group_stats,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "Import of {} finished: {} succeeded, {} failed, {} entered high risk",
            summary.source, summary.succeeded, summary.failed, summary.high_risk_entered
        );
        Ok(summary)
    }

    async fn apply_chain(
        &self,
        component_id: i32,
        rows: Vec<ImportRow>,
        deadline: Option<Instant>,
        actor: &Actor,
        source: &str,
    ) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();
        for row in rows {
            if deadline_passed(deadline) {
                outcome.timed_out = true;
                break;
            }
            match self.apply_row(component_id, &row, actor, source).await {
                Ok(entered_high) => outcome.applied.push(AppliedRow {
                    group_key: row.group_key,
                    entered_high,
                }),
                Err(err) => {
                    warn!("Row {} of {} failed: {}", row.row, source, err);
                    outcome.failed.push(RowError::new(
                        row.row,
                        Some(row.group_key),
                        Some(row.label),
                        &err,
                    ));
                }
            }
        }
        outcome
    }

    /// One row, all-or-nothing. Returns whether the component entered high risk.
    async fn apply_row(
        &self,
        component_id: i32,
        row: &ImportRow,
        actor: &Actor,
        source: &str,
    ) -> EngineResult<bool> {
        let _guard = self.locks.acquire(component_id).await;
        let txn = self.db.begin().await?;

        let component = robot_components::Entity::find_by_id(component_id)
            .one(&txn)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_component", component_id))?;
        let metrics_changed = component.metric_snapshot() != row.metrics;

        let change = assert_risk_level(
            &txn,
            component,
            LevelAssertion {
                level: row.level,
                source: RiskSource::Import,
                source_ref: Some(source.to_string()),
                actor: Some(actor.name.clone()),
                metrics: Some(row.metrics.clone()),
            },
        )
        .await?;

        let entered_high = change.entered_high();
        if entered_high {
            record_detection(
                &txn,
                &change.component,
                DetectionRequest {
                    kind: EventKind::ImportHighRisk,
                    severity: Severity::High,
                    score: 0.0,
                    message: format!(
                        "{} reported high risk by import {} (previously {})",
                        change.component.label,
                        source,
                        change.previous.as_str()
                    ),
                    dedup_window: self.dedup_window,
                },
            )
            .await?;
        }

        let mut active: robot_components::ActiveModel = change.component.into();
        if let Some(mark) = row.mark {
            active.mark = Set(mark);
        }
        if let Some(remark) = row.remark.clone() {
            active.remark = Set(remark);
        }
        if let Some(reference) = row.reference.clone() {
            active.reference = Set(Some(reference));
        }
        if let Some(tech) = row.tech.clone() {
            active.tech = Set(Some(tech));
        }
        if active.is_changed() {
            active.update(&txn).await?;
        }

        if metrics_changed {
            TrendChartCache::invalidate_component(&txn, component_id).await?;
        }

        txn.commit().await?;
        debug!("Applied row {} to component {}", row.row, component_id);
        Ok(entered_high)
    }

    /// Retired: weekly results are no longer staged
    pub async fn stage_weekly_results(&self) -> EngineResult<()> {
        Err(LegacyEndpoint::Stage.invoke())
    }

    /// Retired: weekly results are no longer synced into the registry
    pub async fn sync_weekly_results(&self) -> EngineResult<()> {
        Err(LegacyEndpoint::Sync.invoke())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weekly_result_layout() {
        let csv = "shop,robot,level,mark,remark,type,A1_e_rate,Q1,tem1_m\n\
                   AS33,AS33_020RB_400,H,1,noisy,KR210,0.12,3.5,41\n\
                   AS33,AS33_030RB_100,L,,,KR210,,2.0,\n";
        let batch = CsvImportBatch::from_reader("weekly.csv", csv.as_bytes()).unwrap();
        assert_eq!(batch.rows.len(), 2);

        let first = batch.rows[0].as_ref().unwrap();
        assert_eq!(first.row, 1);
        assert_eq!(first.group_key, "AS33");
        assert_eq!(first.level, RiskLevel::High);
        assert_eq!(first.mark, Some(1));
        assert_eq!(first.metrics.len(), 3);
        assert!(!first.metrics.contains_key("type"));

        let second = batch.rows[1].as_ref().unwrap();
        assert_eq!(second.level, RiskLevel::Normal);
        assert_eq!(second.metrics.len(), 1);
        assert_eq!(second.remark, None);
    }

    #[test]
    fn test_malformed_rows_are_reported_per_row() {
        let csv = "group,label,level,Q1\n\
                   g1,r1,H,1.0\n\
                   g1,r2,X,1.0\n\
                   g1,,M,1.0\n\
                   g1,r4,M,abc\n\
                   g1,r5,M,1.0,extra\n";
        let batch = CsvImportBatch::from_reader("bad.csv", csv.as_bytes()).unwrap();
        assert_eq!(batch.rows.len(), 5);
        assert!(batch.rows[0].is_ok());
        for row in &batch.rows[1..] {
            let err = row.as_ref().unwrap_err();
            assert_eq!(err.kind, "validation_error");
        }
        assert_eq!(batch.rows[2].as_ref().unwrap_err().label, None);
    }

    #[test]
    fn test_header_without_key_columns_is_rejected() {
        let err = CsvImportBatch::from_reader("x.csv", "a,b\n1,2\n".as_bytes()).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}
