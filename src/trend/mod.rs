//! Per-axis error-trend charts, cached per `(component, axis)`.
//!
//! A cached artifact is returned as-is until a caller asks for regeneration
//! or the importer invalidates it. Concurrent computations for one key share
//! a single in-flight computation.
//!
//! Invalidation bumps `robot_components.chart_generation`. A computation only
//! stores its artifact if the generation it started from is still current,
//! so a chart rendered from pre-import data never outlives the import.

pub mod render;
pub mod series;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::*;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::common::Axis;
use crate::database::entities::{robot_components, trend_charts};
use crate::errors::{EngineError, EngineResult};

pub use render::{JsonTrendRenderer, RenderedChart, TrendRenderer};
pub use series::{CsvTrendSource, MemoryTrendSource, MetricSeriesSource};

/// `(component, axis, regenerate)`; a forced regeneration never joins a
/// flight that may settle for the cached artifact
type FlightKey = (i32, Axis, bool);

/// Attempts before giving up on a component whose charts keep going stale
const MAX_COMPUTE_ATTEMPTS: usize = 3;

/// Clonable outcome of a failed computation, shared with every waiter
#[derive(Clone, Debug)]
enum FlightFailure {
    NotFound(i32),
    DataUnavailable(String),
    InvalidState(String),
    Internal(String),
}

impl From<EngineError> for FlightFailure {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound { entity: "robot_component", id } => {
                FlightFailure::NotFound(id.parse().unwrap_or_default())
            }
            EngineError::DataUnavailable(message) => FlightFailure::DataUnavailable(message),
            EngineError::InvalidState(message) => FlightFailure::InvalidState(message),
            other => FlightFailure::Internal(other.to_string()),
        }
    }
}

impl From<FlightFailure> for EngineError {
    fn from(failure: FlightFailure) -> Self {
        match failure {
            FlightFailure::NotFound(id) => EngineError::not_found("robot_component", id),
            FlightFailure::DataUnavailable(message) => EngineError::DataUnavailable(message),
            FlightFailure::InvalidState(message) => EngineError::InvalidState(message),
            FlightFailure::Internal(message) => EngineError::Internal(message),
        }
    }
}

#[derive(Default)]
struct Flight {
    cell: OnceCell<Result<trend_charts::Model, FlightFailure>>,
}

#[derive(Clone)]
pub struct TrendChartCache {
    db: DatabaseConnection,
    source: Arc<dyn MetricSeriesSource>,
    renderer: Arc<dyn TrendRenderer>,
    in_flight: Arc<DashMap<FlightKey, Arc<Flight>>>,
}

impl TrendChartCache {
    pub fn new(
        db: DatabaseConnection,
        source: Arc<dyn MetricSeriesSource>,
        renderer: Arc<dyn TrendRenderer>,
    ) -> Self {
        Self {
            db,
            source,
            renderer,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Cached artifact, or a freshly computed one on miss or `regenerate`.
    /// A failed computation leaves any previous artifact in place.
    pub async fn get(
        &self,
        component_id: i32,
        axis: u8,
        regenerate: bool,
    ) -> EngineResult<trend_charts::Model> {
        let axis = Axis::from_index(axis)?;
        let component = robot_components::Entity::find_by_id(component_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_component", component_id))?;

        if !regenerate {
            if let Some(cached) = self.cached(component_id, axis).await? {
                debug!("Trend chart cache hit for {} {}", component.label, axis);
                return Ok(cached);
            }
        }

        let key = (component_id, axis, regenerate);
        let flight = self.in_flight.entry(key).or_default().clone();

        let outcome = flight
            .cell
            .get_or_init(|| async {
                // An earlier flight may have stored the artifact between our
                // miss and joining this one
                if !regenerate {
                    match self.cached(component_id, axis).await {
                        Ok(Some(cached)) => return Ok(cached),
                        Ok(None) => {}
                        Err(err) => return Err(FlightFailure::from(err)),
                    }
                }
                self.compute(component_id, axis)
                    .await
                    .map_err(FlightFailure::from)
            })
            .await
            .clone();

        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &flight));

        outcome.map_err(EngineError::from)
    }

    pub async fn cached(
        &self,
        component_id: i32,
        axis: Axis,
    ) -> EngineResult<Option<trend_charts::Model>> {
        let chart = trend_charts::Entity::find()
            .filter(trend_charts::Column::ComponentId.eq(component_id))
            .filter(trend_charts::Column::Axis.eq(axis.index() as i32))
            .one(&self.db)
            .await?;
        Ok(chart)
    }

    /// Drop every cached artifact of a component and mark in-flight
    /// computations stale, on the caller's connection
    pub async fn invalidate_component<C: ConnectionTrait>(
        conn: &C,
        component_id: i32,
    ) -> EngineResult<u64> {
        robot_components::Entity::update_many()
            .col_expr(
                robot_components::Column::ChartGeneration,
                Expr::col(robot_components::Column::ChartGeneration).add(1),
            )
            .filter(robot_components::Column::Id.eq(component_id))
            .exec(conn)
            .await?;
        let result = trend_charts::Entity::delete_many()
            .filter(trend_charts::Column::ComponentId.eq(component_id))
            .exec(conn)
            .await?;
        if result.rows_affected > 0 {
            debug!(
                "Invalidated {} trend charts of component {}",
                result.rows_affected, component_id
            );
        }
        Ok(result.rows_affected)
    }

    async fn compute(&self, component_id: i32, axis: Axis) -> EngineResult<trend_charts::Model> {
        for attempt in 1..=MAX_COMPUTE_ATTEMPTS {
            let component = robot_components::Entity::find_by_id(component_id)
                .one(&self.db)
                .await?
                .ok_or_else(|| EngineError::not_found("robot_component", component_id))?;
            if let Some(stored) = self.compute_once(&component, axis).await? {
                return Ok(stored);
            }
            debug!(
                "Trend chart for {} {} went stale during attempt {}",
                component.label, axis, attempt
            );
        }
        Err(EngineError::InvalidState(format!(
            "trend charts of component {} kept changing during generation",
            component_id
        )))
    }

    /// Render and store one artifact. `None` when the component was
    /// invalidated after `component` was read.
    async fn compute_once(
        &self,
        component: &robot_components::Model,
        axis: Axis,
    ) -> EngineResult<Option<trend_charts::Model>> {
        let series = match self.source.load(&component.label, axis).await {
            Ok(series) => series,
            Err(err) => {
                warn!("Trend chart for {} {} unavailable: {}", component.label, axis, err);
                return Err(err);
            }
        };
        if series.points.is_empty() {
            return Err(EngineError::DataUnavailable(format!(
                "trend series for {} is empty",
                component.label
            )));
        }

        let renderer = self.renderer.clone();
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&series)).await??;

        let txn = self.db.begin().await?;
        let current = robot_components::Entity::find_by_id(component.id)
            .one(&txn)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_component", component.id))?;
        if current.chart_generation != component.chart_generation {
            txn.rollback().await?;
            return Ok(None);
        }

        let artifact = trend_charts::ActiveModel {
            component_id: Set(component.id),
            axis: Set(axis.index() as i32),
            generated_at: Set(Utc::now()),
            content_type: Set(rendered.content_type),
            payload: Set(rendered.payload),
            point_count: Set(i32::try_from(rendered.point_count).unwrap_or(i32::MAX)),
            ..Default::default()
        };
        trend_charts::Entity::insert(artifact)
            .on_conflict(
                OnConflict::columns([
                    trend_charts::Column::ComponentId,
                    trend_charts::Column::Axis,
                ])
                .update_columns([
                    trend_charts::Column::GeneratedAt,
                    trend_charts::Column::ContentType,
                    trend_charts::Column::Payload,
                    trend_charts::Column::PointCount,
                ])
                .to_owned(),
            )
            .exec(&txn)
            .await?;
        let stored = trend_charts::Entity::find()
            .filter(trend_charts::Column::ComponentId.eq(component.id))
            .filter(trend_charts::Column::Axis.eq(axis.index() as i32))
            .one(&txn)
            .await?
            .ok_or_else(|| EngineError::Internal("trend chart missing after upsert".to_string()))?;
        txn.commit().await?;

        info!(
            "Generated trend chart for {} {} ({} points)",
            component.label, axis, stored.point_count
        );
        Ok(Some(stored))
    }
}
