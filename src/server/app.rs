use anyhow::{Context, Result};
use axum::{
    routing::{any, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    components, dashboard, groups, gripper_check, health, histories, imports, legacy,
    risk_events,
};
use crate::AppContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: AppContext,
}

pub fn create_app(ctx: AppContext, cors_origin: Option<&str>) -> Result<Router> {
    let state = AppState { ctx };

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<axum::http::HeaderValue>()
                    .with_context(|| format!("invalid CORS origin '{}'", origin))?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state);

    Ok(app)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard::get_dashboard))
        // Registry
        .route("/groups", get(groups::list_groups))
        .route("/components", get(components::list_components))
        .route(
            "/components/:id",
            get(components::get_component)
                .patch(components::patch_component)
                .delete(components::archive_component),
        )
        .route("/components/:id/trend-chart", get(components::trend_chart))
        .route("/weekly-results", get(components::list_components))
        .route("/weekly-results/:endpoint", any(legacy::removed_endpoint))
        // Risk events
        .route("/risk-events", get(risk_events::list_risk_events))
        .route(
            "/risk-events/statistics",
            get(risk_events::risk_event_statistics),
        )
        .route("/risk-events/:id", get(risk_events::get_risk_event))
        .route(
            "/risk-events/:id/acknowledge",
            post(risk_events::acknowledge_risk_event),
        )
        .route(
            "/risk-events/:id/resolve",
            post(risk_events::resolve_risk_event),
        )
        // Trajectory checks
        .route("/gripper-check/tables", get(gripper_check::list_tables))
        .route(
            "/gripper-check/config-template",
            get(gripper_check::config_template),
        )
        .route("/gripper-check/execute", post(gripper_check::execute_check))
        // Imports and history
        .route("/imports/components", post(imports::import_components))
        .route("/high-risk-histories", get(histories::list_histories))
}

pub fn route_table() -> &'static [(&'static str, &'static str)] {
    &[
        ("GET", "/health"),
        ("GET", "/api/v1/dashboard"),
        ("GET", "/api/v1/groups"),
        ("GET", "/api/v1/components"),
        ("GET|PATCH|DELETE", "/api/v1/components/:id"),
        ("GET", "/api/v1/components/:id/trend-chart"),
        ("GET", "/api/v1/risk-events"),
        ("GET", "/api/v1/risk-events/statistics"),
        ("GET", "/api/v1/risk-events/:id"),
        ("POST", "/api/v1/risk-events/:id/acknowledge"),
        ("POST", "/api/v1/risk-events/:id/resolve"),
        ("GET", "/api/v1/gripper-check/tables"),
        ("GET", "/api/v1/gripper-check/config-template"),
        ("POST", "/api/v1/gripper-check/execute"),
        ("POST", "/api/v1/imports/components"),
        ("GET", "/api/v1/high-risk-histories"),
        ("ANY", "/api/v1/weekly-results/:endpoint (removed)"),
    ]
}
