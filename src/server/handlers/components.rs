use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Page, PageRequest};
use crate::database::entities::robot_components::RiskLevel;
use crate::server::actor::RequestActor;
use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::services::registry_service::{ComponentFilter, ComponentPatch, ComponentView, MarkFilter};

#[derive(Debug, Default, Deserialize)]
pub struct ComponentQuery {
    pub group: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub high_risk: Option<bool>,
    pub keyword: Option<String>,
    pub mark: Option<MarkFilter>,
    pub include_archived: Option<bool>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

pub async fn list_components(
    State(state): State<AppState>,
    Query(query): Query<ComponentQuery>,
) -> ApiResult<Page<ComponentView>> {
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.page_size.unwrap_or(defaults.page_size),
    );
    let filter = ComponentFilter {
        group: query.group,
        risk_level: query.risk_level,
        high_risk: query.high_risk,
        keyword: query.keyword,
        mark: query.mark,
        include_archived: query.include_archived.unwrap_or(false),
    };
    let components = state.ctx.registry().list_components(filter, page).await?;
    Ok(Json(components))
}

pub async fn get_component(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<ComponentView> {
    Ok(Json(state.ctx.registry().get_component(id).await?))
}

pub async fn patch_component(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    RequestActor(actor): RequestActor,
    Json(patch): Json<ComponentPatch>,
) -> ApiResult<ComponentView> {
    Ok(Json(
        state.ctx.registry().patch_component(id, patch, &actor).await?,
    ))
}

pub async fn archive_component(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    RequestActor(actor): RequestActor,
) -> ApiResult<ComponentView> {
    Ok(Json(state.ctx.registry().archive_component(id, &actor).await?))
}

#[derive(Debug, Deserialize)]
pub struct TrendChartQuery {
    pub axis: u8,
    #[serde(default)]
    pub regenerate: bool,
}

#[derive(Debug, Serialize)]
pub struct TrendChartResponse {
    pub component_id: i32,
    pub axis: i32,
    pub generated_at: DateTime<Utc>,
    pub content_type: String,
    pub point_count: i32,
    pub chart: Value,
}

pub async fn trend_chart(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<TrendChartQuery>,
) -> ApiResult<TrendChartResponse> {
    let artifact = state
        .ctx
        .charts()
        .get(id, query.axis, query.regenerate)
        .await?;
    let chart = serde_json::from_str(&artifact.payload)
        .unwrap_or_else(|_| Value::String(artifact.payload.clone()));
    Ok(Json(TrendChartResponse {
        component_id: artifact.component_id,
        axis: artifact.axis,
        generated_at: artifact.generated_at,
        content_type: artifact.content_type,
        point_count: artifact.point_count,
        chart,
    }))
}
