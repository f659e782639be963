use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::common::{Axis, TimeWindow};
use crate::errors::{EngineError, EngineResult};

/// One controller sample of a robot trajectory table
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectorySample {
    pub timestamp: DateTime<Utc>,
    /// `Name_C`: program identifier
    pub name: String,
    /// `SNR_C`: cycle serial number
    pub cycle: String,
    /// `P_name`: program path, matched against key paths
    pub path: String,
    /// Indexed by `Axis::index() - 1`
    pub currents: [Option<f64>; 7],
    pub max_limits: [Option<f64>; 7],
    pub min_limits: [Option<f64>; 7],
}

impl TrajectorySample {
    pub fn new(
        timestamp: DateTime<Utc>,
        name: impl Into<String>,
        cycle: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            name: name.into(),
            cycle: cycle.into(),
            path: path.into(),
            currents: [None; 7],
            max_limits: [None; 7],
            min_limits: [None; 7],
        }
    }

    pub fn with_axis(mut self, axis: Axis, current: f64, max_limit: f64, min_limit: f64) -> Self {
        let idx = usize::from(axis.index() - 1);
        self.currents[idx] = Some(current);
        self.max_limits[idx] = Some(max_limit);
        self.min_limits[idx] = Some(min_limit);
        self
    }
}

/// Catalog of trajectory tables, one per robot
#[async_trait]
pub trait TrajectorySource: Send + Sync {
    async fn list_tables(&self) -> EngineResult<Vec<String>>;

    /// Samples of `table` inside `window`, in recorded order
    async fn fetch(&self, table: &str, window: &TimeWindow) -> EngineResult<Vec<TrajectorySample>>;
}

fn in_window(timestamp: &DateTime<Utc>, window: &TimeWindow) -> bool {
    window.since.map_or(true, |since| *timestamp >= since)
        && window.until.map_or(true, |until| *timestamp <= until)
}

/// Reads `<dir>/<table>.csv`
pub struct CsvDirectorySource {
    data_dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn table_names(dir: &Path) -> EngineResult<Vec<String>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(dir).map_err(|e| {
            EngineError::DataUnavailable(format!("cannot list {}: {}", dir.display(), e))
        })?;
        let mut tables = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_csv = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !is_csv {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                tables.insert(stem.to_string_lossy().into_owned());
            }
        }
        Ok(tables.into_iter().collect())
    }
}

#[async_trait]
impl TrajectorySource for CsvDirectorySource {
    async fn list_tables(&self) -> EngineResult<Vec<String>> {
        let dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || Self::table_names(&dir)).await?
    }

    async fn fetch(&self, table: &str, window: &TimeWindow) -> EngineResult<Vec<TrajectorySample>> {
        let dir = self.data_dir.clone();
        let table = table.to_string();
        let window = *window;
        tokio::task::spawn_blocking(move || {
            let name = Self::table_names(&dir)?
                .into_iter()
                .find(|t| t.eq_ignore_ascii_case(&table))
                .ok_or_else(|| EngineError::not_found("trajectory_table", &table))?;
            let path = dir.join(format!("{}.csv", name));
            let samples = read_trajectory_file(&path, &window)?;
            debug!("Read {} samples from {}", samples.len(), path.display());
            Ok(samples)
        })
        .await?
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse one trajectory CSV. Missing identity or current columns and
/// unparsable values reject the whole table.
pub fn read_trajectory_file(path: &Path, window: &TimeWindow) -> EngineResult<Vec<TrajectorySample>> {
    let malformed = |detail: String| {
        EngineError::Validation(format!("table {} is malformed: {}", path.display(), detail))
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| EngineError::DataUnavailable(format!("cannot read {}: {}", path.display(), e)))?;
    let headers = reader.headers().map_err(|e| malformed(e.to_string()))?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let required = |name: &str| column(name).ok_or_else(|| malformed(format!("missing column {}", name)));

    let timestamp_idx = required("Timestamp")?;
    let name_idx = required("Name_C")?;
    let cycle_idx = required("SNR_C")?;
    let path_idx = required("P_name")?;
    let mut current_idx = [0usize; 7];
    let mut max_idx = [None; 7];
    let mut min_idx = [None; 7];
    for axis in Axis::ALL {
        let i = usize::from(axis.index() - 1);
        current_idx[i] = required(&axis.current_column())?;
        max_idx[i] = column(&axis.max_limit_column());
        min_idx[i] = column(&axis.min_limit_column());
    }

    let mut samples = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        let row = line + 1;
        let raw_ts = record.get(timestamp_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| malformed(format!("row {} has timestamp '{}'", row, raw_ts)))?;
        if !in_window(&timestamp, window) {
            continue;
        }

        let number = |idx: Option<usize>| -> EngineResult<Option<f64>> {
            match idx.and_then(|i| record.get(i)).filter(|v| !v.is_empty()) {
                None => Ok(None),
                Some(text) => text
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| malformed(format!("row {} has non-numeric value '{}'", row, text))),
            }
        };

        let mut sample = TrajectorySample::new(
            timestamp,
            record.get(name_idx).unwrap_or(""),
            record.get(cycle_idx).unwrap_or(""),
            record.get(path_idx).unwrap_or(""),
        );
        for i in 0..7 {
            sample.currents[i] = number(Some(current_idx[i]))?;
            sample.max_limits[i] = number(max_idx[i])?;
            sample.min_limits[i] = number(min_idx[i])?;
        }
        samples.push(sample);
    }
    Ok(samples)
}

/// In-memory tables for embedding and tests
#[derive(Clone, Debug, Default)]
pub struct MemoryTrajectorySource {
    tables: BTreeMap<String, Vec<TrajectorySample>>,
    broken: BTreeSet<String>,
}

impl MemoryTrajectorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, samples: Vec<TrajectorySample>) -> Self {
        self.tables.insert(name.to_string(), samples);
        self
    }

    /// Listed, but every fetch fails as unreadable
    pub fn with_broken_table(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }
}

#[async_trait]
impl TrajectorySource for MemoryTrajectorySource {
    async fn list_tables(&self) -> EngineResult<Vec<String>> {
        let names: BTreeSet<String> = self
            .tables
            .keys()
            .chain(self.broken.iter())
            .cloned()
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn fetch(&self, table: &str, window: &TimeWindow) -> EngineResult<Vec<TrajectorySample>> {
        if self.broken.iter().any(|t| t.eq_ignore_ascii_case(table)) {
            return Err(EngineError::DataUnavailable(format!("table {} is unreadable", table)));
        }
        let samples = self
            .tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, samples)| samples)
            .ok_or_else(|| EngineError::not_found("trajectory_table", table))?;
        Ok(samples
            .iter()
            .filter(|s| in_window(&s.timestamp, window))
            .cloned()
            .collect())
    }
}
