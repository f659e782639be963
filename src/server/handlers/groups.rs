use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::services::registry_service::GroupSummary;

#[derive(Debug, Default, Deserialize)]
pub struct GroupQuery {
    pub keyword: Option<String>,
}

pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<Vec<GroupSummary>> {
    let groups = state
        .ctx
        .registry()
        .list_groups(query.keyword.as_deref())
        .await?;
    Ok(Json(groups))
}
