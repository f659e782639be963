//! Trajectory check runs against an in-memory trajectory catalog

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::*;
use robot_risk::config::EngineConfig;
use robot_risk::database::entities::risk_events::{EventKind, EventStatus, Severity};
use robot_risk::database::entities::robot_components::RiskLevel;
use robot_risk::database::entities::{high_risk_histories, risk_events};
use robot_risk::services::registry_service::RegistryService;
use robot_risk::trajectory::{MemoryTrajectorySource, RunStatus, TableStatus};
use robot_risk::trend::MemoryTrendSource;
use sea_orm::sea_query::Expr;
use sea_orm::{EntityTrait, PaginatorTrait};

#[tokio::test]
async fn test_execute_opens_one_event_per_violating_table() -> Result<()> {
    let fx = default_fixture().await?;

    let result = fx.ctx.checks().execute(check_config(&[])).await?;
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.tables_checked, 2);
    assert_eq!(result.tables_passed, 1);
    assert_eq!(result.tables_with_violations, 1);
    assert_eq!(result.events_created, 1);

    let report = result
        .tables
        .iter()
        .find(|t| t.table == ROBOT_A)
        .expect("report for violating table");
    assert_eq!(report.status, TableStatus::Violations);
    assert_eq!(report.severity, Some(Severity::Medium));

    let events = risk_events::Entity::find().all(fx.ctx.db()).await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get_status(), EventStatus::Open);
    assert_eq!(events[0].kind, EventKind::TrajectoryViolation.as_str());
    assert!((events[0].score - 0.9).abs() < 1e-9);

    let component = RegistryService::find_by_table(fx.ctx.db(), ROBOT_A)
        .await?
        .expect("seeded component");
    assert_eq!(component.get_risk_level(), RiskLevel::Medium);
    assert_eq!(component.risk_source.as_deref(), Some("check"));
    Ok(())
}

#[tokio::test]
async fn test_repeated_execute_refreshes_instead_of_duplicating() -> Result<()> {
    let fx = default_fixture().await?;

    let first = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
    assert_eq!(first.events_created, 1);
    let second = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
    assert_eq!(second.events_created, 0);
    assert_eq!(second.events_refreshed, 1);

    let count = risk_events::Entity::find().count(fx.ctx.db()).await?;
    assert_eq!(count, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_executes_share_one_event() -> Result<()> {
    let fx = default_fixture().await?;
    let checks = fx.ctx.checks();

    let runs = (0..4).map(|_| {
        let checks = checks.clone();
        tokio::spawn(async move { checks.execute(check_config(&[ROBOT_A])).await })
    });
    let mut created = 0;
    for run in runs {
        let result = run.await??;
        created += result.events_created;
    }
    assert_eq!(created, 1);

    let count = risk_events::Entity::find().count(fx.ctx.db()).await?;
    assert_eq!(count, 1);
    Ok(())
}

/// Move every event's detection time `age` into the past
async fn backdate_events(fx: &Fixture, age: Duration) -> Result<()> {
    risk_events::Entity::update_many()
        .col_expr(risk_events::Column::DetectedAt, Expr::value(Utc::now() - age))
        .exec(fx.ctx.db())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_event_outside_dedup_window_is_not_reused() -> Result<()> {
    let fx = default_fixture().await?;

    let first = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
    assert_eq!(first.events_created, 1);
    backdate_events(&fx, Duration::days(2)).await?;

    let second = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
    assert_eq!(second.events_created, 1);
    assert_eq!(second.events_refreshed, 0);
    assert_ne!(second.tables[0].event_id, first.tables[0].event_id);
    assert_eq!(risk_events::Entity::find().count(fx.ctx.db()).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_unbounded_dedup_window_reuses_old_events() -> Result<()> {
    for window in [None, Some(0)] {
        let mut config = EngineConfig::default();
        config.trajectory.dedup_window_secs = window;
        let fx = fixture(
            collaborators(trajectories(), MemoryTrendSource::new()),
            config,
        )
        .await?;

        let first = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
        backdate_events(&fx, Duration::days(30)).await?;

        let second = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
        assert_eq!(second.events_created, 0, "window {:?}", window);
        assert_eq!(second.events_refreshed, 1, "window {:?}", window);
        assert_eq!(second.tables[0].event_id, first.tables[0].event_id);
        assert_eq!(risk_events::Entity::find().count(fx.ctx.db()).await?, 1);
    }
    Ok(())
}

#[tokio::test]
async fn test_resolved_event_is_not_reused() -> Result<()> {
    let fx = default_fixture().await?;
    let admin = robot_risk::common::Actor::admin("ops");

    let first = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
    let event_id = first.tables[0].event_id.expect("event id");
    fx.ctx.risk_events().resolve(event_id, &admin, None).await?;

    let second = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
    assert_eq!(second.events_created, 1);
    assert_ne!(second.tables[0].event_id, Some(event_id));
    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_nothing() -> Result<()> {
    let fx = default_fixture().await?;

    let mut config = check_config(&[]);
    config.dry_run = true;
    let result = fx.ctx.checks().execute(config).await?;
    assert!(result.dry_run);
    assert_eq!(result.tables_with_violations, 1);
    assert_eq!(result.events_created, 0);

    assert_eq!(risk_events::Entity::find().count(fx.ctx.db()).await?, 0);
    let component = RegistryService::find_by_table(fx.ctx.db(), ROBOT_A)
        .await?
        .expect("seeded component");
    assert_eq!(component.get_risk_level(), RiskLevel::Normal);
    Ok(())
}

#[tokio::test]
async fn test_critical_violation_enters_high_risk_once() -> Result<()> {
    let fx = default_fixture().await?;

    let mut config = check_config(&[ROBOT_A]);
    config.threshold = Some(0.3);
    let result = fx.ctx.checks().execute(config.clone()).await?;
    assert_eq!(result.tables[0].severity, Some(Severity::Critical));
    fx.ctx.checks().execute(config).await?;

    let component = RegistryService::find_by_table(fx.ctx.db(), ROBOT_A)
        .await?
        .expect("seeded component");
    assert_eq!(component.get_risk_level(), RiskLevel::High);
    let histories = high_risk_histories::Entity::find().all(fx.ctx.db()).await?;
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].previous_level, "normal");
    assert_eq!(histories[0].source, "check");
    Ok(())
}

#[tokio::test]
async fn test_failing_table_yields_partial_failure() -> Result<()> {
    let trajectories = trajectories().with_broken_table(ROBOT_C);
    let fx = fixture(
        collaborators(trajectories, MemoryTrendSource::new()),
        EngineConfig::default(),
    )
    .await?;

    let result = fx
        .ctx
        .checks()
        .execute(check_config(&[ROBOT_A, ROBOT_C, "NO_SUCH_TABLE"]))
        .await?;
    assert_eq!(result.status, RunStatus::PartialFailure);
    assert_eq!(result.tables_failed, 2);
    assert_eq!(result.tables_with_violations, 1);
    assert_eq!(result.events_created, 1);
    Ok(())
}

#[tokio::test]
async fn test_violation_on_unregistered_table_fails_that_table() -> Result<()> {
    let trajectories = MemoryTrajectorySource::new().with_table("ORPHAN_RB_1", cycle("1", 3.5));
    let fx = fixture(
        collaborators(trajectories, MemoryTrendSource::new()),
        EngineConfig::default(),
    )
    .await?;

    let result = fx.ctx.checks().execute(check_config(&[])).await?;
    assert_eq!(result.status, RunStatus::PartialFailure);
    assert_eq!(result.tables[0].status, TableStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_key_paths_without_match_report_no_data() -> Result<()> {
    let fx = default_fixture().await?;

    let mut config = check_config(&[ROBOT_A]);
    config.key_paths = vec!["R9/DO".to_string()];
    let result = fx.ctx.checks().execute(config).await?;
    assert_eq!(result.tables_no_data, 1);
    assert_eq!(result.status, RunStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_zero_timeout_reports_completed_units() -> Result<()> {
    let fx = default_fixture().await?;

    let mut config = check_config(&[]);
    config.timeout_secs = Some(0);
    let err = fx.ctx.checks().execute(config).await.unwrap_err();
    assert_eq!(err.code(), "timeout");
    assert!(matches!(
        err,
        robot_risk::EngineError::Timeout { completed: 0, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_oversized_timeout_runs_without_deadline() -> Result<()> {
    let fx = default_fixture().await?;

    let mut config = check_config(&[]);
    config.timeout_secs = Some(u64::MAX);
    let result = fx.ctx.checks().execute(config).await?;
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.tables_checked, 2);
    assert_eq!(result.events_created, 1);
    Ok(())
}

#[tokio::test]
async fn test_inverted_window_is_rejected() -> Result<()> {
    let fx = default_fixture().await?;

    let mut config = check_config(&[]);
    std::mem::swap(&mut config.start_time, &mut config.end_time);
    let err = fx.ctx.checks().execute(config).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");
    Ok(())
}

#[tokio::test]
async fn test_table_listing_is_filtered_and_sorted() -> Result<()> {
    let fx = default_fixture().await?;

    let all = fx.ctx.checks().list_checkable_tables(None).await?;
    assert_eq!(all, vec![ROBOT_A.to_string(), ROBOT_B.to_string()]);
    let filtered = fx.ctx.checks().list_checkable_tables(Some("030rb")).await?;
    assert_eq!(filtered, vec![ROBOT_B.to_string()]);
    Ok(())
}
