use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::{Actor, Page, PageRequest};
use crate::config::FleetLayout;
use crate::database::entities::robot_components::{MetricSnapshot, RiskLevel, RiskSource};
use crate::database::entities::{high_risk_histories, risk_events, robot_components, robot_groups};
use crate::errors::{EngineError, EngineResult};
use crate::services::component_locks::ComponentLocks;
use crate::services::history_service::{HistoryEntry, HistoryService};

#[derive(Clone, Debug, Serialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: robot_groups::Model,
    pub member_count: u64,
    pub high_risk_count: u64,
}

/// Component as returned to callers, with its group key and decoded metrics
#[derive(Clone, Debug, Serialize)]
pub struct ComponentView {
    pub id: i32,
    pub group_id: i32,
    pub group_key: String,
    pub label: String,
    pub risk_level: RiskLevel,
    pub risk_source: Option<String>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub metrics: MetricSnapshot,
    pub reference: Option<String>,
    pub tech: Option<String>,
    pub mark: i32,
    pub remark: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentView {
    pub fn new(component: robot_components::Model, group_key: String) -> Self {
        Self {
            risk_level: component.get_risk_level(),
            metrics: component.metric_snapshot(),
            id: component.id,
            group_id: component.group_id,
            group_key,
            label: component.label,
            risk_source: component.risk_source,
            last_evaluated_at: component.last_evaluated_at,
            reference: component.reference,
            tech: component.tech,
            mark: component.mark,
            remark: component.remark,
            archived: component.archived,
            created_at: component.created_at,
            updated_at: component.updated_at,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkFilter {
    Zero,
    Nonzero,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ComponentFilter {
    pub group: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub high_risk: Option<bool>,
    pub keyword: Option<String>,
    pub mark: Option<MarkFilter>,
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ComponentPatch {
    pub remark: Option<String>,
    pub mark: Option<i32>,
    pub reference: Option<String>,
    pub tech: Option<String>,
    pub risk_level: Option<RiskLevel>,
}

/// A risk level asserted by one of the writers
#[derive(Clone, Debug)]
pub struct LevelAssertion {
    pub level: RiskLevel,
    pub source: RiskSource,
    pub source_ref: Option<String>,
    pub actor: Option<String>,
    /// Replaces the stored snapshot when present
    pub metrics: Option<MetricSnapshot>,
}

#[derive(Clone, Debug)]
pub struct LevelChange {
    pub component: robot_components::Model,
    pub previous: RiskLevel,
    pub history: Option<high_risk_histories::Model>,
}

impl LevelChange {
    pub fn entered_high(&self) -> bool {
        self.history.is_some()
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct SeedSummary {
    pub groups_created: usize,
    pub groups_updated: usize,
    pub components_created: usize,
}

pub(crate) fn encode_metrics(metrics: &MetricSnapshot) -> EngineResult<String> {
    serde_json::to_string(metrics)
        .map_err(|e| EngineError::Internal(format!("failed to encode metrics: {}", e)))
}

/// Record a new risk level on `component`. Entering high risk from any other
/// level appends a history record in the same transaction.
pub async fn assert_risk_level<C: ConnectionTrait>(
    conn: &C,
    component: robot_components::Model,
    assertion: LevelAssertion,
) -> EngineResult<LevelChange> {
    let previous = component.get_risk_level();

    let history = if assertion.level == RiskLevel::High && previous != RiskLevel::High {
        let metrics = assertion
            .metrics
            .clone()
            .unwrap_or_else(|| component.metric_snapshot());
        let entry = HistoryEntry {
            previous_level: previous,
            source: assertion.source,
            source_ref: assertion.source_ref.clone(),
            actor: assertion.actor.clone(),
            metrics,
        };
        Some(HistoryService::append(conn, &component, entry).await?)
    } else {
        None
    };

    let now = Utc::now();
    let mut active: robot_components::ActiveModel = component.into();
    active.risk_level = Set(assertion.level.into());
    active.risk_source = Set(Some(assertion.source.into()));
    active.last_evaluated_at = Set(Some(now));
    if let Some(metrics) = assertion.metrics.as_ref() {
        active.metrics = Set(encode_metrics(metrics)?);
    }
    active.updated_at = Set(now);
    let component = active.update(conn).await?;

    Ok(LevelChange {
        component,
        previous,
        history,
    })
}

/// Robot groups and their components
#[derive(Clone)]
pub struct RegistryService {
    db: DatabaseConnection,
    locks: ComponentLocks,
}

impl RegistryService {
    pub fn new(db: DatabaseConnection, locks: ComponentLocks) -> Self {
        Self { db, locks }
    }

    pub async fn list_groups(&self, keyword: Option<&str>) -> EngineResult<Vec<GroupSummary>> {
        let mut query = robot_groups::Entity::find();
        if let Some(keyword) = keyword.filter(|k| !k.trim().is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(robot_groups::Column::Key.contains(keyword.trim()))
                    .add(robot_groups::Column::Name.contains(keyword.trim())),
            );
        }
        let groups = query
            .order_by_asc(robot_groups::Column::Key)
            .all(&self.db)
            .await?;

        let components = robot_components::Entity::find()
            .filter(robot_components::Column::Archived.eq(false))
            .all(&self.db)
            .await?;
        let mut counts: HashMap<i32, (u64, u64)> = HashMap::new();
        for component in &components {
            let entry = counts.entry(component.group_id).or_default();
            entry.0 += 1;
            if component.is_high_risk() {
                entry.1 += 1;
            }
        }

        Ok(groups
            .into_iter()
            .map(|group| {
                let (member_count, high_risk_count) =
                    counts.get(&group.id).copied().unwrap_or_default();
                GroupSummary {
                    group,
                    member_count,
                    high_risk_count,
                }
            })
            .collect())
    }

    pub async fn find_group_by_key<C: ConnectionTrait>(
        conn: &C,
        key: &str,
    ) -> EngineResult<Option<robot_groups::Model>> {
        let group = robot_groups::Entity::find()
            .filter(robot_groups::Column::Key.eq(key.trim()))
            .one(conn)
            .await?;
        Ok(group)
    }

    pub async fn list_components(
        &self,
        filter: ComponentFilter,
        page: PageRequest,
    ) -> EngineResult<Page<ComponentView>> {
        let mut query = robot_components::Entity::find();

        if !filter.include_archived {
            query = query.filter(robot_components::Column::Archived.eq(false));
        }
        if let Some(key) = filter.group.as_deref() {
            let group = Self::find_group_by_key(&self.db, key)
                .await?
                .ok_or_else(|| EngineError::not_found("robot_group", key))?;
            query = query.filter(robot_components::Column::GroupId.eq(group.id));
        }
        if let Some(level) = filter.risk_level {
            query = query.filter(robot_components::Column::RiskLevel.eq(level.as_str()));
        }
        match filter.high_risk {
            Some(true) => {
                query = query.filter(robot_components::Column::RiskLevel.eq(RiskLevel::High.as_str()))
            }
            Some(false) => {
                query = query.filter(robot_components::Column::RiskLevel.ne(RiskLevel::High.as_str()))
            }
            None => {}
        }
        if let Some(keyword) = filter.keyword.as_deref().filter(|k| !k.trim().is_empty()) {
            query = query.filter(robot_components::Column::Label.contains(keyword.trim()));
        }
        match filter.mark {
            Some(MarkFilter::Zero) => query = query.filter(robot_components::Column::Mark.eq(0)),
            Some(MarkFilter::Nonzero) => query = query.filter(robot_components::Column::Mark.ne(0)),
            None => {}
        }

        let (page_index, page_size) = page.normalized();
        let paginator = query
            .order_by_asc(robot_components::Column::GroupId)
            .order_by_asc(robot_components::Column::Label)
            .paginate(&self.db, page_size);
        let total = paginator.num_items().await?;
        let components = paginator.fetch_page(page_index).await?;

        let group_keys = self.group_keys().await?;
        let items = components
            .into_iter()
            .map(|component| {
                let key = group_keys.get(&component.group_id).cloned().unwrap_or_default();
                ComponentView::new(component, key)
            })
            .collect();

        Ok(Page {
            items,
            total,
            page: page_index + 1,
            page_size,
        })
    }

    pub async fn get_component(&self, id: i32) -> EngineResult<ComponentView> {
        let component = robot_components::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_component", id))?;
        self.view(component).await
    }

    /// Resolve a component by its natural key. Labels compare case-insensitively.
    pub async fn resolve_component<C: ConnectionTrait>(
        conn: &C,
        group_key: &str,
        label: &str,
    ) -> EngineResult<Option<robot_components::Model>> {
        let Some(group) = Self::find_group_by_key(conn, group_key).await? else {
            return Ok(None);
        };
        let component = robot_components::Entity::find()
            .filter(robot_components::Column::GroupId.eq(group.id))
            .filter(label_matches(label))
            .filter(robot_components::Column::Archived.eq(false))
            .one(conn)
            .await?;
        Ok(component)
    }

    /// Component whose label names the given trajectory table
    pub async fn find_by_table<C: ConnectionTrait>(
        conn: &C,
        table: &str,
    ) -> EngineResult<Option<robot_components::Model>> {
        let mut matches = robot_components::Entity::find()
            .filter(label_matches(table))
            .filter(robot_components::Column::Archived.eq(false))
            .all(conn)
            .await?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(EngineError::Validation(format!(
                "table '{}' matches {} components in different groups",
                table, n
            ))),
        }
    }

    /// Admin-only manual edit. A level change is asserted with source `manual`.
    pub async fn patch_component(
        &self,
        id: i32,
        patch: ComponentPatch,
        actor: &Actor,
    ) -> EngineResult<ComponentView> {
        actor.require_admin("patch component")?;

        let _guard = self.locks.acquire(id).await;
        let txn = self.db.begin().await?;

        let component = robot_components::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_component", id))?;
        if component.archived {
            return Err(EngineError::InvalidState(format!(
                "component {} is archived",
                id
            )));
        }

        let mut active: robot_components::ActiveModel = component.into();
        if let Some(remark) = patch.remark {
            active.remark = Set(remark);
        }
        if let Some(mark) = patch.mark {
            active.mark = Set(mark);
        }
        if let Some(reference) = patch.reference {
            active.reference = Set(Some(reference));
        }
        if let Some(tech) = patch.tech {
            active.tech = Set(Some(tech));
        }
        active.updated_at = Set(Utc::now());
        let mut component = active.update(&txn).await?;

        if let Some(level) = patch.risk_level {
            let change = assert_risk_level(
                &txn,
                component,
                LevelAssertion {
                    level,
                    source: RiskSource::Manual,
                    source_ref: None,
                    actor: Some(actor.name.clone()),
                    metrics: None,
                },
            )
            .await?;
            component = change.component;
        }

        txn.commit().await?;
        info!("Component {} patched by {}", id, actor.name);
        self.view(component).await
    }

    /// Soft-delete a component together with its risk events
    pub async fn archive_component(&self, id: i32, actor: &Actor) -> EngineResult<ComponentView> {
        actor.require_admin("archive component")?;
        let _guard = self.locks.acquire(id).await;
        let txn = self.db.begin().await?;

        let component = robot_components::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_component", id))?;

        let now = Utc::now();
        let component = if component.archived {
            component
        } else {
            let mut active: robot_components::ActiveModel = component.into();
            active.archived = Set(true);
            active.updated_at = Set(now);
            active.update(&txn).await?
        };

        let archived_events = risk_events::Entity::update_many()
            .col_expr(risk_events::Column::Archived, Expr::value(true))
            .col_expr(risk_events::Column::UpdatedAt, Expr::value(now))
            .filter(risk_events::Column::ComponentId.eq(id))
            .filter(risk_events::Column::Archived.eq(false))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        info!(
            "Component {} archived by {} ({} events archived)",
            id, actor.name, archived_events.rows_affected
        );
        self.view(component).await
    }

    /// Create missing groups and components from a fleet layout. Existing
    /// components are left untouched.
    pub async fn apply_layout(&self, layout: &FleetLayout) -> EngineResult<SeedSummary> {
        let mut summary = SeedSummary::default();
        let txn = self.db.begin().await?;
        let now = Utc::now();

        for group_layout in &layout.groups {
            let key = group_layout.key.trim();
            if key.is_empty() {
                return Err(EngineError::Validation("group key must not be empty".to_string()));
            }
            let name = group_layout.name.clone().unwrap_or_else(|| key.to_string());

            let group = match Self::find_group_by_key(&txn, key).await? {
                Some(existing) => {
                    let mut active: robot_groups::ActiveModel = existing.into();
                    active.name = Set(name);
                    active.expected_total = Set(group_layout.expected_total);
                    active.updated_at = Set(now);
                    summary.groups_updated += 1;
                    active.update(&txn).await?
                }
                None => {
                    let group = robot_groups::ActiveModel {
                        key: Set(key.to_string()),
                        name: Set(name),
                        expected_total: Set(group_layout.expected_total),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    };
                    summary.groups_created += 1;
                    group.insert(&txn).await?
                }
            };

            for label in &group_layout.components {
                let label = label.trim();
                if label.is_empty() {
                    continue;
                }
                let exists = robot_components::Entity::find()
                    .filter(robot_components::Column::GroupId.eq(group.id))
                    .filter(label_matches(label))
                    .one(&txn)
                    .await?
                    .is_some();
                if exists {
                    continue;
                }
                let component = robot_components::ActiveModel {
                    group_id: Set(group.id),
                    label: Set(label.to_string()),
                    risk_level: Set(RiskLevel::Normal.into()),
                    metrics: Set("{}".to_string()),
                    mark: Set(0),
                    remark: Set(String::new()),
                    chart_generation: Set(0),
                    archived: Set(false),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                component.insert(&txn).await?;
                debug!("Seeded component {}/{}", key, label);
                summary.components_created += 1;
            }
        }

        txn.commit().await?;
        info!(
            "Fleet layout applied: {} groups created, {} updated, {} components created",
            summary.groups_created, summary.groups_updated, summary.components_created
        );
        Ok(summary)
    }

    async fn group_keys(&self) -> EngineResult<HashMap<i32, String>> {
        let groups = robot_groups::Entity::find().all(&self.db).await?;
        Ok(groups.into_iter().map(|g| (g.id, g.key)).collect())
    }

    async fn view(&self, component: robot_components::Model) -> EngineResult<ComponentView> {
        let group = robot_groups::Entity::find_by_id(component.group_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("robot_group", component.group_id))?;
        Ok(ComponentView::new(component, group.key))
    }
}

fn label_matches(label: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(robot_components::Column::Label)))
        .eq(label.trim().to_lowercase())
}
