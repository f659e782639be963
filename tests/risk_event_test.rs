//! Risk event lifecycle and statistics

mod common;

use anyhow::Result;
use common::*;
use robot_risk::common::{Actor, PageRequest, TimeWindow};
use robot_risk::database::entities::risk_events::{EventStatus, Severity};
use robot_risk::services::risk_event_service::RiskEventFilter;

async fn open_event(fx: &Fixture) -> Result<i32> {
    let result = fx.ctx.checks().execute(check_config(&[ROBOT_A])).await?;
    Ok(result.tables[0].event_id.expect("event opened"))
}

#[tokio::test]
async fn test_acknowledge_then_resolve() -> Result<()> {
    let fx = default_fixture().await?;
    let id = open_event(&fx).await?;
    let events = fx.ctx.risk_events();

    let acked = events
        .acknowledge(id, &Actor::new("alice"), Some("looking into it".to_string()))
        .await?;
    assert_eq!(acked.event.get_status(), EventStatus::Acknowledged);
    assert_eq!(acked.event.acknowledged_by.as_deref(), Some("alice"));
    assert_eq!(acked.event.notes, "looking into it");
    assert!(acked.event.acknowledged_at.is_some());
    assert_eq!(acked.component_label, ROBOT_A);
    assert_eq!(acked.group_key, GROUP);

    let resolved = events
        .resolve(id, &Actor::new("bob"), Some("gripper replaced".to_string()))
        .await?;
    assert_eq!(resolved.event.get_status(), EventStatus::Resolved);
    assert_eq!(resolved.event.resolved_by.as_deref(), Some("bob"));
    assert_eq!(resolved.event.resolution_note.as_deref(), Some("gripper replaced"));
    assert_eq!(resolved.event.acknowledged_by.as_deref(), Some("alice"));
    Ok(())
}

#[tokio::test]
async fn test_open_event_can_be_resolved_directly() -> Result<()> {
    let fx = default_fixture().await?;
    let id = open_event(&fx).await?;

    let resolved = fx.ctx.risk_events().resolve(id, &Actor::new("bob"), None).await?;
    assert_eq!(resolved.event.get_status(), EventStatus::Resolved);
    assert!(resolved.event.acknowledged_at.is_none());
    Ok(())
}

#[tokio::test]
async fn test_illegal_transitions_are_rejected() -> Result<()> {
    let fx = default_fixture().await?;
    let id = open_event(&fx).await?;
    let events = fx.ctx.risk_events();
    let actor = Actor::new("alice");

    events.acknowledge(id, &actor, None).await?;
    let err = events.acknowledge(id, &actor, None).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");

    events.resolve(id, &actor, None).await?;
    let err = events.resolve(id, &actor, None).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");
    let err = events.acknowledge(id, &actor, None).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");

    let err = events.acknowledge(9_999, &actor, None).await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_acknowledge_has_one_winner() -> Result<()> {
    let fx = default_fixture().await?;
    let id = open_event(&fx).await?;

    let tasks: Vec<_> = (0..4)
        .map(|n| {
            let events = fx.ctx.risk_events();
            tokio::spawn(async move {
                events
                    .acknowledge(id, &Actor::new(format!("operator-{}", n)), None)
                    .await
            })
        })
        .collect();
    let mut winners = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => winners += 1,
            Err(err) => assert_eq!(err.code(), "invalid_state"),
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn test_listing_filters_by_status() -> Result<()> {
    let fx = default_fixture().await?;
    let id = open_event(&fx).await?;
    let events = fx.ctx.risk_events();

    let open = events
        .list(
            RiskEventFilter {
                status: Some(EventStatus::Open),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await?;
    assert_eq!(open.total, 1);
    assert_eq!(open.items[0].event.id, id);

    events.acknowledge(id, &Actor::new("alice"), None).await?;
    let open = events
        .list(
            RiskEventFilter {
                status: Some(EventStatus::Open),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await?;
    assert_eq!(open.total, 0);
    Ok(())
}

#[tokio::test]
async fn test_statistics_are_zero_filled() -> Result<()> {
    let fx = default_fixture().await?;
    let events = fx.ctx.risk_events();

    let empty = events.statistics(TimeWindow::default(), None).await?;
    assert_eq!(empty.total, 0);
    assert_eq!(empty.by_status.len(), 3);
    assert_eq!(empty.by_severity.len(), 4);
    assert!(empty.by_status.values().all(|n| *n == 0));

    open_event(&fx).await?;
    let stats = events.statistics(TimeWindow::default(), Some(GROUP)).await?;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_status["open"], 1);
    assert_eq!(stats.by_severity[Severity::Medium.as_str()], 1);
    assert_eq!(stats.recent.len(), 1);

    let err = events
        .statistics(TimeWindow::default(), Some("unknown"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_archiving_component_hides_its_events() -> Result<()> {
    let fx = default_fixture().await?;
    let id = open_event(&fx).await?;
    let event = fx.ctx.risk_events().get(id).await?;

    fx.ctx
        .registry()
        .archive_component(event.event.component_id, &Actor::admin("ops"))
        .await?;
    let listed = fx
        .ctx
        .risk_events()
        .list(RiskEventFilter::default(), PageRequest::default())
        .await?;
    assert_eq!(listed.total, 0);
    Ok(())
}
