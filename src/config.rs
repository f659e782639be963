use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration, loaded from a TOML file. Every field has a default so
/// an empty file (or no file) yields a working setup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub trajectory: TrajectoryConfig,
    pub charts: ChartConfig,
    pub import: ImportConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            cors_origin: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "robot_risk.db".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// Directory holding one `<table>.csv` per robot
    pub data_dir: PathBuf,
    /// Excursion (in current units) above which an axis is flagged
    pub default_threshold: f64,
    /// `None` or `0` matches any unresolved event regardless of age
    pub dedup_window_secs: Option<u64>,
    pub timeout_secs: u64,
    /// Program-name fragments offered by the config template
    pub key_paths: Vec<String>,
    pub lookback_days: i64,
    pub lag_hours: i64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/trajectories"),
            default_threshold: 0.5,
            dedup_window_secs: Some(24 * 60 * 60),
            timeout_secs: 60,
            key_paths: Vec::new(),
            lookback_days: 7,
            lag_hours: 8,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Directory holding `<label>-error-rate-trend.csv` series files
    pub data_dir: PathBuf,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/error-rate"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub timeout_secs: u64,
    /// Components reconciled concurrently within one batch
    pub parallelism: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            parallelism: 8,
        }
    }
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config)
    }
}

/// Fleet layout used to seed the component registry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FleetLayout {
    #[serde(default)]
    pub groups: Vec<GroupLayout>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupLayout {
    pub key: String,
    pub name: Option<String>,
    #[serde(default)]
    pub expected_total: i32,
    #[serde(default)]
    pub components: Vec<String>,
}

impl FleetLayout {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read layout file {}", path.display()))?;
        let layout: FleetLayout = toml::from_str(&content)?;
        Ok(layout)
    }
}
