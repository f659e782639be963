use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::{Actor, Page, PageRequest, TimeWindow};
use crate::database::entities::risk_events::{EventKind, EventStatus, Severity};
use crate::database::entities::{risk_events, robot_components, robot_groups};
use crate::errors::{EngineError, EngineResult};
use crate::services::registry_service::RegistryService;

const RECENT_EVENT_COUNT: u64 = 5;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RiskEventFilter {
    pub status: Option<EventStatus>,
    pub severity: Option<Severity>,
    pub kind: Option<EventKind>,
    pub component_id: Option<i32>,
    pub group: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_archived: bool,
}

/// Event with the label and group of its component
#[derive(Clone, Debug, Serialize)]
pub struct RiskEventView {
    #[serde(flatten)]
    pub event: risk_events::Model,
    pub component_label: String,
    pub group_key: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RiskStatistics {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub total: u64,
    pub by_status: IndexMap<String, u64>,
    pub by_severity: IndexMap<String, u64>,
    pub recent: Vec<RiskEventView>,
}

/// A violation about to be recorded against a component
#[derive(Clone, Debug)]
pub struct DetectionRequest {
    pub kind: EventKind,
    pub severity: Severity,
    pub score: f64,
    pub message: String,
    /// Unresolved events older than this are not reused; `None` reuses any
    pub dedup_window: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionOutcome {
    Created,
    Refreshed,
}

/// Convert the configured window in seconds; `None` and `0` mean unbounded
pub fn dedup_window(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0)
        .map(|s| Duration::seconds(i64::try_from(s).unwrap_or(i64::MAX).min(i64::MAX / 1000)))
}

/// Insert a new open event, or refresh the matching unresolved one in place.
///
/// Must run inside the caller's per-component critical section so that the
/// lookup and the write cannot interleave with another writer.
pub async fn record_detection<C: ConnectionTrait>(
    conn: &C,
    component: &robot_components::Model,
    request: DetectionRequest,
) -> EngineResult<(risk_events::Model, DetectionOutcome)> {
    let now = Utc::now();

    let mut lookup = risk_events::Entity::find()
        .filter(risk_events::Column::ComponentId.eq(component.id))
        .filter(risk_events::Column::Kind.eq(request.kind.as_str()))
        .filter(risk_events::Column::Status.is_in([
            EventStatus::Open.as_str(),
            EventStatus::Acknowledged.as_str(),
        ]))
        .filter(risk_events::Column::Archived.eq(false));
    if let Some(cutoff) = request
        .dedup_window
        .and_then(|window| now.checked_sub_signed(window))
    {
        lookup = lookup.filter(risk_events::Column::DetectedAt.gte(cutoff));
    }
    let existing = lookup
        .order_by_desc(risk_events::Column::DetectedAt)
        .one(conn)
        .await?;

    match existing {
        Some(event) => {
            let mut active: risk_events::ActiveModel = event.into();
            active.detected_at = Set(now);
            active.severity = Set(request.severity.into());
            active.score = Set(request.score);
            active.message = Set(request.message);
            active.updated_at = Set(now);
            let event = active.update(conn).await?;
            debug!("Refreshed risk event {} on component {}", event.id, component.id);
            Ok((event, DetectionOutcome::Refreshed))
        }
        None => {
            let event = risk_events::ActiveModel {
                component_id: Set(component.id),
                group_id: Set(component.group_id),
                kind: Set(request.kind.into()),
                severity: Set(request.severity.into()),
                status: Set(EventStatus::Open.into()),
                score: Set(request.score),
                message: Set(request.message),
                detected_at: Set(now),
                notes: Set(String::new()),
                archived: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let event = event.insert(conn).await?;
            info!(
                "Risk event {} ({}, {}) opened on component {}",
                event.id, event.kind, event.severity, component.label
            );
            Ok((event, DetectionOutcome::Created))
        }
    }
}

/// Risk event queries and the acknowledge/resolve workflow
#[derive(Clone)]
pub struct RiskEventService {
    db: DatabaseConnection,
}

impl RiskEventService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: i32) -> EngineResult<RiskEventView> {
        let event = self.find(id).await?;
        let mut views = self.views(vec![event]).await?;
        views
            .pop()
            .ok_or_else(|| EngineError::Internal(format!("risk event {} vanished", id)))
    }

    /// Newest first
    pub async fn list(
        &self,
        filter: RiskEventFilter,
        page: PageRequest,
    ) -> EngineResult<Page<RiskEventView>> {
        TimeWindow {
            since: filter.since,
            until: filter.until,
        }
        .validate()?;

        let mut query = risk_events::Entity::find();
        if !filter.include_archived {
            query = query.filter(risk_events::Column::Archived.eq(false));
        }
        if let Some(status) = filter.status {
            query = query.filter(risk_events::Column::Status.eq(status.as_str()));
        }
        if let Some(severity) = filter.severity {
            query = query.filter(risk_events::Column::Severity.eq(severity.as_str()));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(risk_events::Column::Kind.eq(kind.as_str()));
        }
        if let Some(component_id) = filter.component_id {
            query = query.filter(risk_events::Column::ComponentId.eq(component_id));
        }
        if let Some(key) = filter.group.as_deref() {
            let group = RegistryService::find_group_by_key(&self.db, key)
                .await?
                .ok_or_else(|| EngineError::not_found("robot_group", key))?;
            query = query.filter(risk_events::Column::GroupId.eq(group.id));
        }
        if let Some(since) = filter.since {
            query = query.filter(risk_events::Column::DetectedAt.gte(since));
        }
        if let Some(until) = filter.until {
            query = query.filter(risk_events::Column::DetectedAt.lte(until));
        }

        let (page_index, page_size) = page.normalized();
        let paginator = query
            .order_by_desc(risk_events::Column::DetectedAt)
            .order_by_desc(risk_events::Column::Id)
            .paginate(&self.db, page_size);
        let total = paginator.num_items().await?;
        let events = paginator.fetch_page(page_index).await?;

        Ok(Page {
            items: self.views(events).await?,
            total,
            page: page_index + 1,
            page_size,
        })
    }

    /// Open -> Acknowledged. The status guard sits in the UPDATE itself so
    /// only the first of several concurrent acknowledgements applies.
    pub async fn acknowledge(
        &self,
        id: i32,
        actor: &Actor,
        notes: Option<String>,
    ) -> EngineResult<RiskEventView> {
        let now = Utc::now();
        let result = risk_events::Entity::update_many()
            .col_expr(
                risk_events::Column::Status,
                Expr::value(EventStatus::Acknowledged.as_str()),
            )
            .col_expr(risk_events::Column::AcknowledgedBy, Expr::value(actor.name.clone()))
            .col_expr(risk_events::Column::AcknowledgedAt, Expr::value(now))
            .col_expr(risk_events::Column::Notes, Expr::value(notes.unwrap_or_default()))
            .col_expr(risk_events::Column::UpdatedAt, Expr::value(now))
            .filter(risk_events::Column::Id.eq(id))
            .filter(risk_events::Column::Status.eq(EventStatus::Open.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            let event = self.find(id).await?;
            return Err(EngineError::InvalidState(format!(
                "risk event {} is {} and can no longer be acknowledged",
                id, event.status
            )));
        }

        info!("Risk event {} acknowledged by {}", id, actor.name);
        self.get(id).await
    }

    /// Open or Acknowledged -> Resolved
    pub async fn resolve(
        &self,
        id: i32,
        actor: &Actor,
        notes: Option<String>,
    ) -> EngineResult<RiskEventView> {
        let now = Utc::now();
        let result = risk_events::Entity::update_many()
            .col_expr(
                risk_events::Column::Status,
                Expr::value(EventStatus::Resolved.as_str()),
            )
            .col_expr(risk_events::Column::ResolvedBy, Expr::value(actor.name.clone()))
            .col_expr(risk_events::Column::ResolvedAt, Expr::value(now))
            .col_expr(risk_events::Column::ResolutionNote, Expr::value(notes))
            .col_expr(risk_events::Column::UpdatedAt, Expr::value(now))
            .filter(risk_events::Column::Id.eq(id))
            .filter(risk_events::Column::Status.ne(EventStatus::Resolved.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            self.find(id).await?;
            return Err(EngineError::InvalidState(format!(
                "risk event {} is already resolved",
                id
            )));
        }

        info!("Risk event {} resolved by {}", id, actor.name);
        self.get(id).await
    }

    /// Counts by status and severity over the window (default: last 24 hours)
    pub async fn statistics(
        &self,
        window: TimeWindow,
        group: Option<&str>,
    ) -> EngineResult<RiskStatistics> {
        window.validate()?;
        let until = window.until.unwrap_or_else(Utc::now);
        let since = window.since.unwrap_or(until - Duration::hours(24));
        if since > until {
            return Err(EngineError::Validation(
                "window start must not be after its end".to_string(),
            ));
        }

        let mut query = risk_events::Entity::find()
            .filter(risk_events::Column::Archived.eq(false))
            .filter(risk_events::Column::DetectedAt.gte(since))
            .filter(risk_events::Column::DetectedAt.lte(until));
        if let Some(key) = group {
            let group = RegistryService::find_group_by_key(&self.db, key)
                .await?
                .ok_or_else(|| EngineError::not_found("robot_group", key))?;
            query = query.filter(risk_events::Column::GroupId.eq(group.id));
        }

        let events = query
            .order_by_desc(risk_events::Column::DetectedAt)
            .order_by_desc(risk_events::Column::Id)
            .all(&self.db)
            .await?;

        let mut by_status: IndexMap<String, u64> = EventStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_severity: IndexMap<String, u64> = Severity::ALL
            .iter()
            .rev()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for event in &events {
            *by_status.entry(event.status.clone()).or_default() += 1;
            *by_severity.entry(event.severity.clone()).or_default() += 1;
        }

        let total = events.len() as u64;
        let recent = events
            .into_iter()
            .take(RECENT_EVENT_COUNT as usize)
            .collect();

        Ok(RiskStatistics {
            since,
            until,
            total,
            by_status,
            by_severity,
            recent: self.views(recent).await?,
        })
    }

    async fn find(&self, id: i32) -> EngineResult<risk_events::Model> {
        risk_events::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("risk_event", id))
    }

    async fn views(&self, events: Vec<risk_events::Model>) -> EngineResult<Vec<RiskEventView>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let component_ids: Vec<i32> = events.iter().map(|e| e.component_id).collect();
        let labels: HashMap<i32, String> = robot_components::Entity::find()
            .filter(robot_components::Column::Id.is_in(component_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.label))
            .collect();
        let group_keys: HashMap<i32, String> = robot_groups::Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|g| (g.id, g.key))
            .collect();

        Ok(events
            .into_iter()
            .map(|event| RiskEventView {
                component_label: labels.get(&event.component_id).cloned().unwrap_or_default(),
                group_key: group_keys.get(&event.group_id).cloned().unwrap_or_default(),
                event,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_window_conversion() {
        assert_eq!(dedup_window(None), None);
        assert_eq!(dedup_window(Some(0)), None);
        assert_eq!(dedup_window(Some(3600)), Some(Duration::hours(1)));
    }
}
