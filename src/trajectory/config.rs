use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::common::{Axis, TimeWindow};
use crate::config::TrajectoryConfig;
use crate::errors::{EngineError, EngineResult};

/// Tables to check: `"all"` or `{"tables": [...]}`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TableSelection {
    #[default]
    All,
    Tables(Vec<String>),
}

impl Serialize for TableSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TableSelection::All => serializer.serialize_str("all"),
            TableSelection::Tables(tables) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("tables", tables)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for TableSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Keyword(String),
            Named { tables: Vec<String> },
            List(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Keyword(keyword) if keyword.trim().eq_ignore_ascii_case("all") => {
                Ok(TableSelection::All)
            }
            Raw::Keyword(other) => Err(de::Error::custom(format!(
                "table selection must be \"all\" or {{\"tables\": [...]}}, got \"{}\"",
                other
            ))),
            Raw::Named { tables } | Raw::List(tables) => Ok(TableSelection::Tables(tables)),
        }
    }
}

/// Parameters of one trajectory check run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub tables: TableSelection,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Program-name fragments; empty scores every cycle
    #[serde(default)]
    pub key_paths: Vec<String>,
    /// Default excursion threshold; falls back to the engine default
    pub threshold: Option<f64>,
    #[serde(default)]
    pub axis_thresholds: BTreeMap<Axis, f64>,
    #[serde(default)]
    pub dry_run: bool,
    pub timeout_secs: Option<u64>,
}

impl CheckConfig {
    /// Config pre-filled from engine defaults
    pub fn template(defaults: &TrajectoryConfig) -> Self {
        let window = default_window(defaults);
        Self {
            tables: TableSelection::All,
            start_time: window.since,
            end_time: window.until,
            key_paths: defaults.key_paths.clone(),
            threshold: Some(defaults.default_threshold),
            axis_thresholds: BTreeMap::new(),
            dry_run: false,
            timeout_secs: Some(defaults.timeout_secs),
        }
    }

    /// Effective time window, filling open ends from the defaults
    pub fn window(&self, defaults: &TrajectoryConfig) -> EngineResult<TimeWindow> {
        let fallback = default_window(defaults);
        let window = TimeWindow {
            since: self.start_time.or(fallback.since),
            until: self.end_time.or(fallback.until),
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let thresholds = self.threshold.iter().chain(self.axis_thresholds.values());
        for threshold in thresholds {
            if !threshold.is_finite() || *threshold < 0.0 {
                return Err(EngineError::Validation(format!(
                    "threshold must be a non-negative number, got {}",
                    threshold
                )));
            }
        }
        if let TableSelection::Tables(tables) = &self.tables {
            if tables.iter().all(|t| t.trim().is_empty()) {
                return Err(EngineError::Validation(
                    "table selection names no tables".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn threshold_for(&self, axis: Axis, default: f64) -> f64 {
        self.axis_thresholds
            .get(&axis)
            .copied()
            .or(self.threshold)
            .unwrap_or(default)
    }
}

/// `now - lookback_days .. now - lag_hours`
pub fn default_window(defaults: &TrajectoryConfig) -> TimeWindow {
    let now = Utc::now();
    TimeWindow {
        since: Some(now - Duration::days(defaults.lookback_days)),
        until: Some(now - Duration::hours(defaults.lag_hours)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_selection_forms() {
        let all: TableSelection = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, TableSelection::All);
        let named: TableSelection = serde_json::from_str(r#"{"tables": ["rb1", "rb2"]}"#).unwrap();
        assert_eq!(named, TableSelection::Tables(vec!["rb1".into(), "rb2".into()]));
        assert!(serde_json::from_str::<TableSelection>("\"some\"").is_err());

        assert_eq!(serde_json::to_string(&TableSelection::All).unwrap(), "\"all\"");
        assert_eq!(
            serde_json::to_value(&named).unwrap(),
            serde_json::json!({"tables": ["rb1", "rb2"]})
        );
    }

    #[test]
    fn test_template_uses_defaults() {
        let defaults = TrajectoryConfig {
            key_paths: vec!["R1/CO".to_string()],
            ..Default::default()
        };
        let template = CheckConfig::template(&defaults);
        assert_eq!(template.tables, TableSelection::All);
        assert_eq!(template.key_paths, vec!["R1/CO".to_string()]);
        let start = template.start_time.unwrap();
        let end = template.end_time.unwrap();
        assert_eq!((end - start).num_hours(), 7 * 24 - 8);
    }

    #[test]
    fn test_thresholds() {
        let config: CheckConfig = serde_json::from_str(
            r#"{"tables": "all", "threshold": 1.0, "axis_thresholds": {"A3": 2.5}}"#,
        )
        .unwrap();
        assert_eq!(config.threshold_for(Axis::A3, 0.5), 2.5);
        assert_eq!(config.threshold_for(Axis::A1, 0.5), 1.0);
        assert!(config.validate().is_ok());

        let bad = CheckConfig {
            threshold: Some(-1.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let now = Utc::now();
        let config = CheckConfig {
            start_time: Some(now),
            end_time: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(config.window(&TrajectoryConfig::default()).is_err());
    }
}
