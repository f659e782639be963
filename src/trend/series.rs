use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::common::Axis;
use crate::errors::{EngineError, EngineResult};

/// One row of an error-rate trend file before preprocessing
#[derive(Clone, Debug, Default)]
pub struct TrendRow {
    pub timestamp: String,
    pub count: f64,
    pub reference: Option<String>,
    pub values: HashMap<String, f64>,
}

/// The seven quantities charted for one axis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    Q,
    ERate,
    Rms,
    CurrMin,
    CurrMax,
    Temperature,
    Error,
}

impl Panel {
    pub const ALL: [Panel; 7] = [
        Panel::Q,
        Panel::ERate,
        Panel::Rms,
        Panel::CurrMin,
        Panel::CurrMax,
        Panel::Temperature,
        Panel::Error,
    ];

    /// Source column in the trend file for `axis`
    pub fn column(self, axis: Axis) -> String {
        let n = axis.index();
        match self {
            Panel::Q => format!("Q{}", n),
            Panel::ERate => format!("A{}_e_rate", n),
            Panel::Rms => format!("A{}_Rms", n),
            Panel::CurrMin => format!("Curr_A{}_min", n),
            Panel::CurrMax => format!("Curr_A{}_max", n),
            Panel::Temperature => format!("tem{}_m", n),
            Panel::Error => "error1_c1".to_string(),
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Panel::Q => "q",
            Panel::ERate => "e_rate",
            Panel::Rms => "rms",
            Panel::CurrMin => "curr_min",
            Panel::CurrMax => "curr_max",
            Panel::Temperature => "temperature",
            Panel::Error => "error",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SeriesPoint {
    pub timestamp: String,
    /// Indexed like `Panel::ALL`; `None` where the cell is empty
    pub values: [Option<f64>; 7],
}

#[derive(Clone, Debug, Serialize)]
pub struct AxisSeries {
    pub label: String,
    pub axis: Axis,
    pub points: Vec<SeriesPoint>,
}

/// Drop low-sample rows (count below half the mean), then keep only rows
/// measured against the most recent reference.
pub fn preprocess(rows: Vec<TrendRow>) -> Vec<TrendRow> {
    if rows.is_empty() {
        return rows;
    }
    let mean = rows.iter().map(|r| r.count).sum::<f64>() / rows.len() as f64;
    let kept: Vec<TrendRow> = rows.into_iter().filter(|r| r.count >= mean / 2.0).collect();

    let latest_reference = kept.last().and_then(|r| r.reference.clone());
    match latest_reference {
        Some(reference) => kept
            .into_iter()
            .filter(|r| r.reference.as_deref() == Some(reference.as_str()))
            .collect(),
        None => kept,
    }
}

pub fn build_series(label: &str, axis: Axis, rows: Vec<TrendRow>) -> EngineResult<AxisSeries> {
    let rows = preprocess(rows);
    if rows.is_empty() {
        return Err(EngineError::DataUnavailable(format!(
            "no usable trend rows for {} after filtering",
            label
        )));
    }
    let columns: Vec<String> = Panel::ALL.iter().map(|p| p.column(axis)).collect();
    let points = rows
        .into_iter()
        .map(|row| {
            let mut values = [None; 7];
            for (slot, column) in values.iter_mut().zip(&columns) {
                *slot = row.values.get(column).copied();
            }
            SeriesPoint {
                timestamp: row.timestamp,
                values,
            }
        })
        .collect();
    Ok(AxisSeries {
        label: label.to_string(),
        axis,
        points,
    })
}

/// Supplies the per-axis metric series behind a trend chart
#[async_trait]
pub trait MetricSeriesSource: Send + Sync {
    async fn load(&self, label: &str, axis: Axis) -> EngineResult<AxisSeries>;
}

/// Reads `<dir>/<label>-error-rate-trend.csv`
pub struct CsvTrendSource {
    data_dir: PathBuf,
}

impl CsvTrendSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn file_path(&self, label: &str) -> PathBuf {
        self.data_dir.join(format!("{}-error-rate-trend.csv", label))
    }
}

#[async_trait]
impl MetricSeriesSource for CsvTrendSource {
    async fn load(&self, label: &str, axis: Axis) -> EngineResult<AxisSeries> {
        let path = self.file_path(label);
        let label = label.to_string();
        tokio::task::spawn_blocking(move || {
            let rows = read_trend_file(&path)?;
            debug!("Read {} trend rows from {}", rows.len(), path.display());
            build_series(&label, axis, rows)
        })
        .await?
    }
}

pub fn read_trend_file(path: &Path) -> EngineResult<Vec<TrendRow>> {
    if !path.exists() {
        return Err(EngineError::DataUnavailable(format!(
            "trend file {} does not exist",
            path.display()
        )));
    }
    let corrupt = |detail: String| {
        EngineError::DataUnavailable(format!("trend file {} is corrupt: {}", path.display(), detail))
    };

    let mut reader = csv::Reader::from_path(path).map_err(|e| corrupt(e.to_string()))?;
    let headers = reader.headers().map_err(|e| corrupt(e.to_string()))?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim() == name);
    let timestamp_idx = position("Timestamp").ok_or_else(|| corrupt("missing Timestamp column".into()))?;
    let count_idx = position("count").ok_or_else(|| corrupt("missing count column".into()))?;
    let reference_idx = position("reference");

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| corrupt(e.to_string()))?;
        let count_field = record.get(count_idx).unwrap_or("").trim();
        let count: f64 = count_field
            .parse()
            .map_err(|_| corrupt(format!("row {} has count '{}'", line + 1, count_field)))?;

        let mut values = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if idx == timestamp_idx || idx == count_idx || Some(idx) == reference_idx {
                continue;
            }
            if let Some(value) = record.get(idx).and_then(|v| v.trim().parse::<f64>().ok()) {
                values.insert(header.trim().to_string(), value);
            }
        }

        rows.push(TrendRow {
            timestamp: record.get(timestamp_idx).unwrap_or("").trim().to_string(),
            count,
            reference: reference_idx
                .and_then(|idx| record.get(idx))
                .map(|r| r.trim().to_string()),
            values,
        });
    }
    Ok(rows)
}

/// In-memory series keyed by label, for embedding and tests
#[derive(Default)]
pub struct MemoryTrendSource {
    rows: HashMap<String, Vec<TrendRow>>,
    delay: Option<Duration>,
    loads: Arc<AtomicUsize>,
}

impl MemoryTrendSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, label: &str, rows: Vec<TrendRow>) -> Self {
        self.rows.insert(label.to_lowercase(), rows);
        self
    }

    /// Simulated computation time, to widen race windows in tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of completed `load` calls
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }
}

#[async_trait]
impl MetricSeriesSource for MemoryTrendSource {
    async fn load(&self, label: &str, axis: Axis) -> EngineResult<AxisSeries> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        let rows = self
            .rows
            .get(&label.to_lowercase())
            .cloned()
            .ok_or_else(|| EngineError::DataUnavailable(format!("no trend series for {}", label)))?;
        build_series(label, axis, rows)
    }
}
