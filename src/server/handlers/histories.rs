use axum::extract::{Query, State};
use axum::Json;

use crate::database::entities::high_risk_histories;
use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::services::history_service::HistoryFilter;

pub async fn list_histories(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> ApiResult<Vec<high_risk_histories::Model>> {
    Ok(Json(state.ctx.histories().list(filter).await?))
}
