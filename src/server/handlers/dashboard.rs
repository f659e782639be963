use axum::extract::State;
use axum::Json;

use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::services::dashboard_service::Dashboard;

pub async fn get_dashboard(State(state): State<AppState>) -> ApiResult<Dashboard> {
    Ok(Json(state.ctx.dashboard().dashboard().await?))
}
