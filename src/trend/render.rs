use serde_json::json;

use super::series::{AxisSeries, Panel};
use crate::errors::{EngineError, EngineResult};

#[derive(Clone, Debug)]
pub struct RenderedChart {
    pub content_type: String,
    pub payload: String,
    pub point_count: usize,
}

/// Turns a series into an opaque chart artifact
pub trait TrendRenderer: Send + Sync {
    fn render(&self, series: &AxisSeries) -> EngineResult<RenderedChart>;
}

/// Emits a JSON document with one scatter panel per quantity, top to bottom
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonTrendRenderer;

pub const JSON_CONTENT_TYPE: &str = "application/vnd.robot-risk.trend+json";

fn panel_color(panel: Panel) -> &'static str {
    match panel {
        Panel::Q => "tab:blue",
        Panel::ERate => "tab:orange",
        Panel::Rms => "tab:green",
        Panel::CurrMin => "tab:pink",
        Panel::CurrMax => "yellow",
        Panel::Temperature | Panel::Error => "tab:red",
    }
}

fn panel_label(panel: Panel, series: &AxisSeries) -> String {
    let n = series.axis.index();
    match panel {
        Panel::Q => format!("Q{}", n),
        Panel::ERate => format!("A{}_e_rate", n),
        Panel::Rms => format!("A{}_Rms", n),
        Panel::CurrMin => "Min".to_string(),
        Panel::CurrMax => "Max".to_string(),
        Panel::Temperature => format!("T{}", n),
        Panel::Error => "error".to_string(),
    }
}

impl TrendRenderer for JsonTrendRenderer {
    fn render(&self, series: &AxisSeries) -> EngineResult<RenderedChart> {
        let panels: Vec<serde_json::Value> = Panel::ALL
            .iter()
            .enumerate()
            .map(|(idx, panel)| {
                let points: Vec<serde_json::Value> = series
                    .points
                    .iter()
                    .filter_map(|p| p.values[idx].map(|v| json!([p.timestamp, v])))
                    .collect();
                json!({
                    "key": panel.key(),
                    "column": panel.column(series.axis),
                    "label": panel_label(*panel, series),
                    "color": panel_color(*panel),
                    "points": points,
                })
            })
            .collect();

        let document = json!({
            "label": series.label,
            "axis": series.axis.to_string(),
            "x_label": "Timestamp",
            "panels": panels,
        });
        let payload = serde_json::to_string(&document)
            .map_err(|e| EngineError::Internal(format!("failed to encode chart: {}", e)))?;

        Ok(RenderedChart {
            content_type: JSON_CONTENT_TYPE.to_string(),
            payload,
            point_count: series.points.len(),
        })
    }
}
