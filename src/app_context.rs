use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::EngineConfig;
use crate::services::risk_event_service::dedup_window;
use crate::services::{
    ComponentLocks, DashboardService, HistoryService, ImportService, RegistryService,
    RiskEventService,
};
use crate::trajectory::{
    CheckEngine, CsvDirectorySource, ToleranceBandScorer, TrajectorySource, ViolationScorer,
};
use crate::trend::{CsvTrendSource, JsonTrendRenderer, MetricSeriesSource, TrendChartCache, TrendRenderer};

/// Pluggable data collaborators of the engine
#[derive(Clone)]
pub struct Collaborators {
    pub trajectories: Arc<dyn TrajectorySource>,
    pub scorer: Arc<dyn ViolationScorer>,
    pub series: Arc<dyn MetricSeriesSource>,
    pub renderer: Arc<dyn TrendRenderer>,
}

impl Collaborators {
    /// CSV-backed sources rooted at the configured data directories
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            trajectories: Arc::new(CsvDirectorySource::new(config.trajectory.data_dir.clone())),
            scorer: Arc::new(ToleranceBandScorer),
            series: Arc::new(CsvTrendSource::new(config.charts.data_dir.clone())),
            renderer: Arc::new(JsonTrendRenderer),
        }
    }
}

/// Shared application context wiring every service to one database and one
/// set of per-component locks
#[derive(Clone)]
pub struct AppContext {
    db: DatabaseConnection,
    config: Arc<EngineConfig>,
    locks: ComponentLocks,
    registry: Arc<RegistryService>,
    risk_events: Arc<RiskEventService>,
    histories: Arc<HistoryService>,
    dashboard: Arc<DashboardService>,
    imports: Arc<ImportService>,
    charts: Arc<TrendChartCache>,
    checks: Arc<CheckEngine>,
}

impl AppContext {
    pub fn new(db: DatabaseConnection, config: EngineConfig) -> Self {
        let collaborators = Collaborators::from_config(&config);
        Self::with_collaborators(db, config, collaborators)
    }

    pub fn with_collaborators(
        db: DatabaseConnection,
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Self {
        let locks = ComponentLocks::new();
        let window = dedup_window(config.trajectory.dedup_window_secs);

        let registry = Arc::new(RegistryService::new(db.clone(), locks.clone()));
        let risk_events = Arc::new(RiskEventService::new(db.clone()));
        let histories = Arc::new(HistoryService::new(db.clone()));
        let dashboard = Arc::new(DashboardService::new(db.clone()));
        let imports = Arc::new(ImportService::new(
            db.clone(),
            locks.clone(),
            config.import.clone(),
            window,
        ));
        let charts = Arc::new(TrendChartCache::new(
            db.clone(),
            collaborators.series,
            collaborators.renderer,
        ));
        let checks = Arc::new(CheckEngine::new(
            db.clone(),
            locks.clone(),
            collaborators.trajectories,
            collaborators.scorer,
            config.trajectory.clone(),
        ));

        Self {
            db,
            config: Arc::new(config),
            locks,
            registry,
            risk_events,
            histories,
            dashboard,
            imports,
            charts,
            checks,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Per-component critical sections shared by every writer
    pub fn locks(&self) -> &ComponentLocks {
        &self.locks
    }

    pub fn registry(&self) -> Arc<RegistryService> {
        self.registry.clone()
    }

    pub fn risk_events(&self) -> Arc<RiskEventService> {
        self.risk_events.clone()
    }

    pub fn histories(&self) -> Arc<HistoryService> {
        self.histories.clone()
    }

    pub fn dashboard(&self) -> Arc<DashboardService> {
        self.dashboard.clone()
    }

    pub fn imports(&self) -> Arc<ImportService> {
        self.imports.clone()
    }

    pub fn charts(&self) -> Arc<TrendChartCache> {
        self.charts.clone()
    }

    pub fn checks(&self) -> Arc<CheckEngine> {
        self.checks.clone()
    }
}
