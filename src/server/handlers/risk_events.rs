use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::common::{Page, PageRequest, TimeWindow};
use crate::database::entities::risk_events::{EventKind, EventStatus, Severity};
use crate::server::actor::RequestActor;
use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::services::risk_event_service::{RiskEventFilter, RiskEventView, RiskStatistics};

#[derive(Debug, Default, Deserialize)]
pub struct RiskEventQuery {
    pub status: Option<EventStatus>,
    pub severity: Option<Severity>,
    pub kind: Option<EventKind>,
    pub component_id: Option<i32>,
    pub group: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub include_archived: Option<bool>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

pub async fn list_risk_events(
    State(state): State<AppState>,
    Query(query): Query<RiskEventQuery>,
) -> ApiResult<Page<RiskEventView>> {
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.page_size.unwrap_or(defaults.page_size),
    );
    let filter = RiskEventFilter {
        status: query.status,
        severity: query.severity,
        kind: query.kind,
        component_id: query.component_id,
        group: query.group,
        since: query.since,
        until: query.until,
        include_archived: query.include_archived.unwrap_or(false),
    };
    Ok(Json(state.ctx.risk_events().list(filter, page).await?))
}

pub async fn get_risk_event(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<RiskEventView> {
    Ok(Json(state.ctx.risk_events().get(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    pub notes: Option<String>,
}

pub async fn acknowledge_risk_event(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    RequestActor(actor): RequestActor,
    body: Option<Json<NotesRequest>>,
) -> ApiResult<RiskEventView> {
    let notes = body.and_then(|Json(b)| b.notes);
    Ok(Json(
        state.ctx.risk_events().acknowledge(id, &actor, notes).await?,
    ))
}

pub async fn resolve_risk_event(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    RequestActor(actor): RequestActor,
    body: Option<Json<NotesRequest>>,
) -> ApiResult<RiskEventView> {
    let notes = body.and_then(|Json(b)| b.notes);
    Ok(Json(state.ctx.risk_events().resolve(id, &actor, notes).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub group: Option<String>,
}

pub async fn risk_event_statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> ApiResult<RiskStatistics> {
    let window = TimeWindow {
        since: query.since,
        until: query.until,
    };
    Ok(Json(
        state
            .ctx
            .risk_events()
            .statistics(window, query.group.as_deref())
            .await?,
    ))
}
