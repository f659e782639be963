//! Fleet overview: per-group counts, level distribution, hourly event
//! activity and the most recently touched components, in one read.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, DurationRound, Utc};
use indexmap::IndexMap;
use sea_orm::*;
use serde::Serialize;
use tracing::debug;

use crate::database::entities::robot_components::RiskLevel;
use crate::database::entities::{high_risk_histories, risk_events, robot_components, robot_groups};
use crate::errors::{EngineError, EngineResult};
use crate::services::registry_service::ComponentView;

/// High-risk components previewed per group
pub const HIGH_RISK_PREVIEW_LIMIT: usize = 12;
/// Length of the recently-updated and high-risk lists
pub const LIST_LIMIT: usize = 20;
const EVENT_HOURS: i64 = 24;

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct FleetCounts {
    pub total: u64,
    pub high_risk: u64,
    /// Components that entered high risk at least once
    pub history_high_risk: u64,
    pub marked: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ComponentBrief {
    pub id: i32,
    pub label: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupDashboard {
    pub key: String,
    pub name: String,
    pub expected_total: i32,
    #[serde(flatten)]
    pub counts: FleetCounts,
    pub high_risk_preview: Vec<ComponentBrief>,
    pub high_risk_preview_limit: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct HourlyCount {
    pub hour: DateTime<Utc>,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Dashboard {
    pub summary: FleetCounts,
    pub groups: Vec<GroupDashboard>,
    pub level_distribution: IndexMap<String, u64>,
    /// One bucket per hour, oldest first, ending with the current hour
    pub events_24h: Vec<HourlyCount>,
    pub recent_updated: Vec<ComponentView>,
    pub high_risk_list: Vec<ComponentView>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DashboardService {
    db: DatabaseConnection,
}

impl DashboardService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Overview of every non-archived component
    pub async fn dashboard(&self) -> EngineResult<Dashboard> {
        let now = Utc::now();

        let groups = robot_groups::Entity::find()
            .order_by_asc(robot_groups::Column::Key)
            .all(&self.db)
            .await?;
        let mut components = robot_components::Entity::find()
            .filter(robot_components::Column::Archived.eq(false))
            .all(&self.db)
            .await?;
        components.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        let ever_high: HashSet<i32> = high_risk_histories::Entity::find()
            .select_only()
            .column(high_risk_histories::Column::ComponentId)
            .distinct()
            .into_tuple::<i32>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();

        let mut summary = FleetCounts::default();
        let mut per_group: HashMap<i32, (FleetCounts, Vec<ComponentBrief>)> = HashMap::new();
        let mut level_distribution: IndexMap<String, u64> = [
            RiskLevel::Normal,
            RiskLevel::Medium,
            RiskLevel::High,
        ]
        .iter()
        .map(|level| (level.as_str().to_string(), 0))
        .collect();

        for component in &components {
            let high = component.is_high_risk();
            let (counts, preview) = per_group.entry(component.group_id).or_default();
            for counts in [&mut summary, counts] {
                counts.total += 1;
                counts.high_risk += u64::from(high);
                counts.history_high_risk += u64::from(ever_high.contains(&component.id));
                counts.marked += u64::from(component.mark != 0);
            }
            if high && preview.len() < HIGH_RISK_PREVIEW_LIMIT {
                preview.push(ComponentBrief {
                    id: component.id,
                    label: component.label.clone(),
                });
            }
            *level_distribution
                .entry(component.get_risk_level().as_str().to_string())
                .or_default() += 1;
        }

        let group_keys: HashMap<i32, String> =
            groups.iter().map(|g| (g.id, g.key.clone())).collect();
        let view = |component: &robot_components::Model| {
            let key = group_keys.get(&component.group_id).cloned().unwrap_or_default();
            ComponentView::new(component.clone(), key)
        };
        let recent_updated = components.iter().take(LIST_LIMIT).map(view).collect();
        let high_risk_list = components
            .iter()
            .filter(|c| c.is_high_risk())
            .take(LIST_LIMIT)
            .map(view)
            .collect();

        let groups = groups
            .into_iter()
            .map(|group| {
                let (counts, high_risk_preview) = per_group.remove(&group.id).unwrap_or_default();
                GroupDashboard {
                    key: group.key,
                    name: group.name,
                    expected_total: group.expected_total,
                    counts,
                    high_risk_preview,
                    high_risk_preview_limit: HIGH_RISK_PREVIEW_LIMIT,
                }
            })
            .collect();

        let events_24h = self.hourly_events(now).await?;
        debug!(
            "Dashboard built over {} components and {} groups",
            summary.total,
            group_keys.len()
        );

        Ok(Dashboard {
            summary,
            groups,
            level_distribution,
            events_24h,
            recent_updated,
            high_risk_list,
            generated_at: now,
        })
    }

    /// Non-archived events per hour, zero-filled
    async fn hourly_events(&self, now: DateTime<Utc>) -> EngineResult<Vec<HourlyCount>> {
        let current_hour = now
            .duration_trunc(Duration::hours(1))
            .map_err(|e| EngineError::Internal(format!("failed to truncate {}: {}", now, e)))?;
        let first_hour = current_hour - Duration::hours(EVENT_HOURS - 1);

        let mut buckets: Vec<HourlyCount> = (0..EVENT_HOURS)
            .map(|offset| HourlyCount {
                hour: first_hour + Duration::hours(offset),
                count: 0,
            })
            .collect();

        let detected: Vec<DateTime<Utc>> = risk_events::Entity::find()
            .select_only()
            .column(risk_events::Column::DetectedAt)
            .filter(risk_events::Column::Archived.eq(false))
            .filter(risk_events::Column::DetectedAt.gte(first_hour))
            .filter(risk_events::Column::DetectedAt.lte(now))
            .into_tuple()
            .all(&self.db)
            .await?;
        for at in detected {
            let offset = (at - first_hour).num_hours();
            if let Some(bucket) = usize::try_from(offset).ok().and_then(|i| buckets.get_mut(i)) {
                bucket.count += 1;
            }
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Actor;
    use crate::config::{FleetLayout, GroupLayout};
    use crate::database::test_utils::setup_test_db;
    use crate::services::registry_service::{ComponentPatch, RegistryService};
    use crate::services::ComponentLocks;

    fn layout() -> FleetLayout {
        FleetLayout {
            groups: vec![
                GroupLayout {
                    key: "as33".to_string(),
                    name: Some("Assembly 33".to_string()),
                    expected_total: 3,
                    components: vec!["AS33_020RB_400".to_string(), "AS33_030RB_100".to_string()],
                },
                GroupLayout {
                    key: "bs10".to_string(),
                    name: None,
                    expected_total: 1,
                    components: vec!["BS10_001RB_100".to_string()],
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_empty_fleet_is_zero_filled() {
        let db = setup_test_db().await;
        let dashboard = DashboardService::new(db).dashboard().await.unwrap();

        assert_eq!(dashboard.summary, FleetCounts::default());
        assert!(dashboard.groups.is_empty());
        assert_eq!(dashboard.events_24h.len(), 24);
        assert!(dashboard.events_24h.iter().all(|b| b.count == 0));
        assert!(dashboard.events_24h[0].hour < dashboard.events_24h[23].hour);
        assert_eq!(
            dashboard.level_distribution.keys().collect::<Vec<_>>(),
            vec!["normal", "medium", "high"]
        );
    }

    #[tokio::test]
    async fn test_counts_follow_patches_and_archiving() {
        let db = setup_test_db().await;
        let registry = RegistryService::new(db.clone(), ComponentLocks::new());
        registry.apply_layout(&layout()).await.unwrap();
        let admin = Actor::admin("ops");
        let first = RegistryService::find_by_table(&db, "AS33_020RB_400")
            .await
            .unwrap()
            .unwrap();
        let second = RegistryService::find_by_table(&db, "AS33_030RB_100")
            .await
            .unwrap()
            .unwrap();

        registry
            .patch_component(
                first.id,
                ComponentPatch {
                    risk_level: Some(RiskLevel::High),
                    mark: Some(2),
                    ..Default::default()
                },
                &admin,
            )
            .await
            .unwrap();
        registry
            .patch_component(
                second.id,
                ComponentPatch {
                    risk_level: Some(RiskLevel::High),
                    ..Default::default()
                },
                &admin,
            )
            .await
            .unwrap();
        registry
            .patch_component(
                second.id,
                ComponentPatch {
                    risk_level: Some(RiskLevel::Medium),
                    ..Default::default()
                },
                &admin,
            )
            .await
            .unwrap();

        let dashboard = DashboardService::new(db.clone()).dashboard().await.unwrap();
        assert_eq!(
            dashboard.summary,
            FleetCounts {
                total: 3,
                high_risk: 1,
                history_high_risk: 2,
                marked: 1,
            }
        );
        assert_eq!(dashboard.level_distribution["high"], 1);
        assert_eq!(dashboard.level_distribution["medium"], 1);
        assert_eq!(dashboard.level_distribution["normal"], 1);

        let as33 = &dashboard.groups[0];
        assert_eq!(as33.key, "as33");
        assert_eq!(as33.expected_total, 3);
        assert_eq!(as33.counts.total, 2);
        assert_eq!(as33.high_risk_preview.len(), 1);
        assert_eq!(as33.high_risk_preview[0].label, "AS33_020RB_400");
        assert_eq!(dashboard.groups[1].counts.high_risk, 0);

        assert_eq!(dashboard.high_risk_list.len(), 1);
        assert_eq!(dashboard.recent_updated.len(), 3);
        assert_eq!(dashboard.recent_updated[0].id, second.id);

        registry.archive_component(first.id, &admin).await.unwrap();
        let dashboard = DashboardService::new(db).dashboard().await.unwrap();
        assert_eq!(dashboard.summary.total, 2);
        assert_eq!(dashboard.summary.high_risk, 0);
        assert_eq!(dashboard.summary.history_high_risk, 1);
        assert!(dashboard.high_risk_list.is_empty());
    }
}
