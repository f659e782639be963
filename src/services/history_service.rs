use chrono::{DateTime, Utc};
use sea_orm::*;
use serde::Deserialize;
use tracing::info;

use crate::database::entities::robot_components::{MetricSnapshot, RiskLevel, RiskSource};
use crate::database::entities::{high_risk_histories, robot_components, robot_groups};
use crate::errors::{EngineError, EngineResult};

const DEFAULT_LIMIT: u64 = 100;
const MAX_LIMIT: u64 = 1000;

/// Entry about to be appended for a component that just became high risk
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub previous_level: RiskLevel,
    pub source: RiskSource,
    pub source_ref: Option<String>,
    pub actor: Option<String>,
    pub metrics: MetricSnapshot,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct HistoryFilter {
    pub group: Option<String>,
    pub component_id: Option<i32>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// Append-only ledger of components entering high risk
#[derive(Clone)]
pub struct HistoryService {
    db: DatabaseConnection,
}

impl HistoryService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append a record. Runs on the caller's connection so it commits or
    /// rolls back together with the level change that triggered it.
    pub async fn append<C: ConnectionTrait>(
        conn: &C,
        component: &robot_components::Model,
        entry: HistoryEntry,
    ) -> EngineResult<high_risk_histories::Model> {
        let metrics = serde_json::to_string(&entry.metrics)
            .map_err(|e| EngineError::Internal(format!("failed to encode metrics: {}", e)))?;

        let record = high_risk_histories::ActiveModel {
            component_id: Set(component.id),
            group_id: Set(component.group_id),
            label: Set(component.label.clone()),
            previous_level: Set(entry.previous_level.into()),
            entered_at: Set(Utc::now()),
            source: Set(entry.source.into()),
            source_ref: Set(entry.source_ref),
            actor: Set(entry.actor),
            metrics: Set(metrics),
            ..Default::default()
        };
        let record = record.insert(conn).await?;

        info!(
            "Component {} ({}) entered high risk via {}",
            component.id, component.label, record.source
        );
        Ok(record)
    }

    /// Newest first
    pub async fn list(&self, filter: HistoryFilter) -> EngineResult<Vec<high_risk_histories::Model>> {
        let mut query = high_risk_histories::Entity::find();

        if let Some(key) = filter.group.as_deref() {
            let group = robot_groups::Entity::find()
                .filter(robot_groups::Column::Key.eq(key))
                .one(&self.db)
                .await?
                .ok_or_else(|| EngineError::not_found("robot_group", key))?;
            query = query.filter(high_risk_histories::Column::GroupId.eq(group.id));
        }
        if let Some(component_id) = filter.component_id {
            query = query.filter(high_risk_histories::Column::ComponentId.eq(component_id));
        }
        if let Some(since) = filter.since {
            query = query.filter(high_risk_histories::Column::EnteredAt.gte(since));
        }
        if let Some(until) = filter.until {
            query = query.filter(high_risk_histories::Column::EnteredAt.lte(until));
        }

        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let records = query
            .order_by_desc(high_risk_histories::Column::EnteredAt)
            .order_by_desc(high_risk_histories::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(records)
    }

    pub async fn count_for_component(&self, component_id: i32) -> EngineResult<u64> {
        let count = high_risk_histories::Entity::find()
            .filter(high_risk_histories::Column::ComponentId.eq(component_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }
}
