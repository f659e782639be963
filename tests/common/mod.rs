//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use robot_risk::common::Axis;
use robot_risk::config::{EngineConfig, FleetLayout, GroupLayout};
use robot_risk::database::connection::setup_database;
use robot_risk::trajectory::{
    CheckConfig, MemoryTrajectorySource, TableSelection, ToleranceBandScorer, TrajectorySample,
};
use robot_risk::trend::{JsonTrendRenderer, MemoryTrendSource};
use robot_risk::{AppContext, Collaborators};
use tempfile::NamedTempFile;

pub const GROUP: &str = "as33";
pub const ROBOT_A: &str = "AS33_020RB_400";
pub const ROBOT_B: &str = "AS33_030RB_100";
pub const ROBOT_C: &str = "AS33_040RB_200";

/// Context over a file-backed database; the temp file lives as long as this
pub struct Fixture {
    pub ctx: AppContext,
    _db_file: NamedTempFile,
}

pub async fn fixture(collaborators: Collaborators, config: EngineConfig) -> Result<Fixture> {
    let db_file = NamedTempFile::new()?;
    let db_url = format!("sqlite://{}?mode=rwc", db_file.path().display());
    let db = setup_database(&db_url).await?;

    let ctx = AppContext::with_collaborators(db, config, collaborators);
    ctx.registry().apply_layout(&layout()).await?;
    Ok(Fixture {
        ctx,
        _db_file: db_file,
    })
}

pub async fn default_fixture() -> Result<Fixture> {
    fixture(collaborators(trajectories(), MemoryTrendSource::new()), EngineConfig::default()).await
}

pub fn layout() -> FleetLayout {
    FleetLayout {
        groups: vec![GroupLayout {
            key: GROUP.to_string(),
            name: Some("Assembly 33".to_string()),
            expected_total: 3,
            components: vec![ROBOT_A.to_string(), ROBOT_B.to_string(), ROBOT_C.to_string()],
        }],
    }
}

pub fn collaborators(trajectories: MemoryTrajectorySource, series: MemoryTrendSource) -> Collaborators {
    Collaborators {
        trajectories: Arc::new(trajectories),
        scorer: Arc::new(ToleranceBandScorer),
        series: Arc::new(series),
        renderer: Arc::new(JsonTrendRenderer),
    }
}

pub fn sample_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

/// One cycle on A1 with the given peak current against a +/-2.0 band
pub fn cycle(serial: &str, peak: f64) -> Vec<TrajectorySample> {
    vec![
        TrajectorySample::new(sample_time(), "GRIP", serial, "R1/CO_grip")
            .with_axis(Axis::A1, 1.0, 2.0, -2.0),
        TrajectorySample::new(sample_time(), "GRIP", serial, "")
            .with_axis(Axis::A1, peak, 2.0, -2.0),
    ]
}

/// ROBOT_A exceeds the band by 0.9, ROBOT_B stays inside it
pub fn trajectories() -> MemoryTrajectorySource {
    MemoryTrajectorySource::new()
        .with_table(ROBOT_A, cycle("1", 2.9))
        .with_table(ROBOT_B, cycle("1", 1.5))
}

pub fn check_config(tables: &[&str]) -> CheckConfig {
    CheckConfig {
        tables: if tables.is_empty() {
            TableSelection::All
        } else {
            TableSelection::Tables(tables.iter().map(|t| t.to_string()).collect())
        },
        start_time: Some(sample_time() - chrono::Duration::hours(1)),
        end_time: Some(sample_time() + chrono::Duration::hours(1)),
        threshold: Some(0.5),
        ..Default::default()
    }
}
