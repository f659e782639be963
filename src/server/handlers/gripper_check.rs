use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::trajectory::{CheckConfig, CheckResult};

#[derive(Debug, Default, Deserialize)]
pub struct TableQuery {
    pub filter: Option<String>,
}

pub async fn list_tables(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> ApiResult<Vec<String>> {
    let tables = state
        .ctx
        .checks()
        .list_checkable_tables(query.filter.as_deref())
        .await?;
    Ok(Json(tables))
}

pub async fn config_template(State(state): State<AppState>) -> ApiResult<CheckConfig> {
    Ok(Json(state.ctx.checks().config_template()))
}

/// Runs on its own task so a dropped connection does not abandon a
/// half-applied run
pub async fn execute_check(
    State(state): State<AppState>,
    Json(config): Json<CheckConfig>,
) -> ApiResult<CheckResult> {
    info!("Trajectory check requested");
    let engine = state.ctx.checks();
    let result = tokio::spawn(async move { engine.execute(config).await })
        .await
        .map_err(crate::errors::EngineError::from)??;
    Ok(Json(result))
}
