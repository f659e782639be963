//! API integration tests
//!
//! Tests for the REST endpoints served under `/api/v1`

mod common;

use anyhow::Result;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use common::*;
use robot_risk::server::app::create_app;
use serde_json::{json, Value};

async fn setup_test_server() -> Result<(TestServer, Fixture)> {
    let fx = default_fixture().await?;
    let app = create_app(fx.ctx.clone(), None)?;
    let server = TestServer::new(app)?;
    Ok((server, fx))
}

fn admin_headers() -> [(HeaderName, HeaderValue); 2] {
    [
        (HeaderName::from_static("x-actor"), HeaderValue::from_static("ops")),
        (HeaderName::from_static("x-actor-role"), HeaderValue::from_static("admin")),
    ]
}

fn check_payload(tables: &[&str]) -> Value {
    serde_json::to_value(check_config(tables)).expect("config serializes")
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["service"], "robot-risk-engine");
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_registry_listing() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;

    let response = server.get("/api/v1/groups").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let groups: Value = response.json();
    assert_eq!(groups[0]["key"], GROUP);
    assert_eq!(groups[0]["member_count"], 3);

    let response = server
        .get("/api/v1/components")
        .add_query_param("keyword", "030rb")
        .add_query_param("page_size", 10)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let page: Value = response.json();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["label"], ROBOT_B);

    let alias: Value = server.get("/api/v1/weekly-results").await.json();
    assert_eq!(alias["total"], 3);

    let response = server.get("/api/v1/components/9999").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "not_found");
    Ok(())
}

#[tokio::test]
async fn test_patch_component_requires_admin() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;
    let page: Value = server.get("/api/v1/components").await.json();
    let id = page["items"][0]["id"].as_i64().expect("component id");
    let path = format!("/api/v1/components/{}", id);
    let patch = json!({"risk_level": "high", "remark": "worn gripper"});

    let response = server.patch(&path).json(&patch).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let [(actor_name, actor_value), (role_name, role_value)] = admin_headers();
    let response = server
        .patch(&path)
        .add_header(actor_name, actor_value)
        .add_header(role_name, role_value)
        .json(&patch)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["risk_level"], "high");
    assert_eq!(body["remark"], "worn gripper");

    let histories: Value = server.get("/api/v1/high-risk-histories").await.json();
    assert_eq!(histories.as_array().map(Vec::len), Some(1));
    assert_eq!(histories[0]["actor"], "ops");
    Ok(())
}

#[tokio::test]
async fn test_archive_component_requires_admin() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;
    let page: Value = server.get("/api/v1/components").await.json();
    let id = page["items"][0]["id"].as_i64().expect("component id");
    let path = format!("/api/v1/components/{}", id);

    let response = server.delete(&path).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"], "forbidden");

    let [(actor_name, actor_value), (role_name, role_value)] = admin_headers();
    let response = server
        .delete(&path)
        .add_header(actor_name, actor_value)
        .add_header(role_name, role_value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["archived"], true);
    Ok(())
}

#[tokio::test]
async fn test_dashboard_reflects_check_results() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;

    let dashboard: Value = server.get("/api/v1/dashboard").await.json();
    assert_eq!(dashboard["summary"]["total"], 3);
    assert_eq!(dashboard["summary"]["high_risk"], 0);
    assert_eq!(dashboard["events_24h"].as_array().map(Vec::len), Some(24));

    let mut payload = check_payload(&[ROBOT_A]);
    payload["threshold"] = json!(0.3);
    let response = server.post("/api/v1/gripper-check/execute").json(&payload).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server.get("/api/v1/dashboard").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let dashboard: Value = response.json();
    assert_eq!(dashboard["summary"]["high_risk"], 1);
    assert_eq!(dashboard["summary"]["history_high_risk"], 1);
    assert_eq!(dashboard["level_distribution"]["high"], 1);
    assert_eq!(dashboard["high_risk_list"][0]["label"], ROBOT_A);
    assert_eq!(dashboard["groups"][0]["high_risk_preview"][0]["label"], ROBOT_A);
    let events: u64 = dashboard["events_24h"]
        .as_array()
        .expect("hourly buckets")
        .iter()
        .filter_map(|bucket| bucket["count"].as_u64())
        .sum();
    assert_eq!(events, 1);
    Ok(())
}

#[tokio::test]
async fn test_gripper_check_flow() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;

    let tables: Value = server.get("/api/v1/gripper-check/tables").await.json();
    assert_eq!(tables, json!([ROBOT_A, ROBOT_B]));

    let template: Value = server.get("/api/v1/gripper-check/config-template").await.json();
    assert_eq!(template["tables"], "all");
    assert_eq!(template["dry_run"], false);

    let response = server
        .post("/api/v1/gripper-check/execute")
        .json(&check_payload(&[]))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let result: Value = response.json();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["events_created"], 1);

    let events: Value = server
        .get("/api/v1/risk-events")
        .add_query_param("status", "open")
        .await
        .json();
    assert_eq!(events["total"], 1);
    let id = events["items"][0]["id"].as_i64().expect("event id");
    assert_eq!(events["items"][0]["component_label"], ROBOT_A);

    let response = server
        .post(&format!("/api/v1/risk-events/{}/acknowledge", id))
        .add_header(HeaderName::from_static("x-actor"), HeaderValue::from_static("alice"))
        .json(&json!({"notes": "checking"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "acknowledged");
    assert_eq!(body["acknowledged_by"], "alice");

    let response = server
        .post(&format!("/api/v1/risk-events/{}/acknowledge", id))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_state");

    let response = server
        .post(&format!("/api/v1/risk-events/{}/resolve", id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let stats: Value = server.get("/api/v1/risk-events/statistics").await.json();
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["by_status"]["resolved"], 1);
    assert_eq!(stats["by_status"]["open"], 0);
    Ok(())
}

#[tokio::test]
async fn test_execute_timeout_maps_to_gateway_timeout() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;
    let mut payload = check_payload(&[]);
    payload["timeout_secs"] = json!(0);

    let response = server.post("/api/v1/gripper-check/execute").json(&payload).await;
    assert_eq!(response.status_code(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json();
    assert_eq!(body["error"], "timeout");
    assert_eq!(body["completed"], 0);
    Ok(())
}

#[tokio::test]
async fn test_csv_import_endpoint() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;
    let csv = format!("shop,robot,level,Q1\n{},{},H,3.2\n{},NOPE_RB_1,H,1\n", GROUP, ROBOT_A, GROUP);

    let response = server
        .post("/api/v1/imports/components")
        .text(csv.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let [(actor_name, actor_value), (role_name, role_value)] = admin_headers();
    let response = server
        .post("/api/v1/imports/components")
        .add_query_param("source", "week-18.csv")
        .add_header(actor_name, actor_value)
        .add_header(role_name, role_value)
        .text(csv)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let summary: Value = response.json();
    assert_eq!(summary["source"], "week-18.csv");
    assert_eq!(summary["status"], "partial_failure");
    assert_eq!(summary["succeeded"], 1);
    assert_eq!(summary["high_risk_entered"], 1);

    let [(actor_name, actor_value), (role_name, role_value)] = admin_headers();
    let response = server
        .post("/api/v1/imports/components")
        .add_header(actor_name, actor_value)
        .add_header(role_name, role_value)
        .text("a,b\n1,2\n")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let [(actor_name, actor_value), (role_name, role_value)] = admin_headers();
    let response = server
        .post("/api/v1/imports/components")
        .add_query_param("timeout_secs", 0)
        .add_header(actor_name, actor_value)
        .add_header(role_name, role_value)
        .text(format!("shop,robot,level\n{},{},M\n", GROUP, ROBOT_B))
        .await;
    assert_eq!(response.status_code(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json();
    assert_eq!(body["completed"], 0);
    Ok(())
}

#[tokio::test]
async fn test_trend_chart_endpoint_errors() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;
    let page: Value = server.get("/api/v1/components").await.json();
    let id = page["items"][0]["id"].as_i64().expect("component id");

    let response = server
        .get(&format!("/api/v1/components/{}/trend-chart", id))
        .add_query_param("axis", 9)
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = server
        .get(&format!("/api/v1/components/{}/trend-chart", id))
        .add_query_param("axis", 2)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "data_unavailable");
    Ok(())
}

#[tokio::test]
async fn test_weekly_result_endpoints_are_gone() -> Result<()> {
    let (server, _fx) = setup_test_server().await?;

    for path in ["stats", "files", "sync", "stage"] {
        let url = format!("/api/v1/weekly-results/{}", path);
        let response = server.get(&url).await;
        assert_eq!(response.status_code(), StatusCode::GONE);
        let body: Value = response.json();
        assert_eq!(body["error"], "removed");

        let response = server.post(&url).await;
        assert_eq!(response.status_code(), StatusCode::GONE);
    }

    let response = server.get("/api/v1/weekly-results/unknown").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    Ok(())
}
