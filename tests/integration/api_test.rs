//! Integration tests for the HTTP API.

mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use enrollhub_entity::consumer::Consumer;

use helpers::{TestApp, consumers, resource};

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(vec![], vec![]);
    let resp = app.request("GET", "/api/health", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["success"], true);
    assert_eq!(resp.body["data"]["status"], "ok");
    assert_eq!(resp.body["data"]["lease_pool"]["size"], 10);
}

#[tokio::test]
async fn test_enroll_then_query() {
    let app = TestApp::new(vec![resource(1, 2, 3.0)], vec![Consumer::eligible("S1")]);

    let resp = app
        .request(
            "POST",
            "/api/enrollments",
            Some(json!({ "consumer_id": "S1", "resource_id": 1 })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{:?}", resp.body);
    assert_eq!(resp.body["data"]["resource"]["held"], 1);
    let allocation_id = resp.body["data"]["allocation"]["id"]
        .as_u64()
        .expect("allocation id");

    let resp = app.request("GET", "/api/resources/1", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["held"], 1);
    assert_eq!(resp.body["data"]["capacity"], 2);

    let resp = app
        .request("GET", "/api/consumers/S1/ledger/2025-fall", None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["consumer_id"], "S1");
    assert_eq!(resp.body["data"]["term"], "2025-fall");

    let resp = app
        .request("GET", "/api/consumers/S1/allocations?term=2025-fall", None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"].as_array().map(Vec::len), Some(1));

    let resp = app
        .request("DELETE", &format!("/api/enrollments/{allocation_id}"), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["held_released"], true);
    assert_eq!(resp.body["data"]["resource"]["held"], 0);
}

#[tokio::test]
async fn test_business_rule_rejection_is_conflict_with_details() {
    let app = TestApp::new(vec![resource(1, 1, 3.0)], consumers("S", 2));
    app.request(
        "POST",
        "/api/enrollments",
        Some(json!({ "consumer_id": "S1", "resource_id": 1 })),
    )
    .await;

    let resp = app
        .request(
            "POST",
            "/api/enrollments",
            Some(json!({ "consumer_id": "S2", "resource_id": 1 })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.body["error"], "CONFLICT");
    assert_eq!(resp.body["details"]["code"], "capacity_exceeded");
    assert_eq!(resp.body["details"]["class"], "business_rule");
}

#[tokio::test]
async fn test_not_found_statuses() {
    let app = TestApp::new(vec![resource(1, 1, 3.0)], vec![Consumer::eligible("S1")]);

    let resp = app.request("GET", "/api/resources/404", None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app
        .request(
            "POST",
            "/api/enrollments",
            Some(json!({ "consumer_id": "nobody", "resource_id": 1 })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.body["details"]["code"], "consumer_not_found");

    let resp = app.request("DELETE", "/api/enrollments/999", None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_input_is_bad_request() {
    let app = TestApp::new(vec![], vec![]);

    let resp = app
        .request(
            "POST",
            "/api/enrollments",
            Some(json!({ "consumer_id": "", "resource_id": 1 })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"], "VALIDATION");

    let resp = app
        .request("GET", "/api/consumers/S1/ledger/someday", None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_endpoints() {
    let app = TestApp::new(vec![resource(1, 5, 3.0)], vec![Consumer::eligible("S1")]);
    app.request(
        "POST",
        "/api/enrollments",
        Some(json!({ "consumer_id": "S1", "resource_id": 1 })),
    )
    .await;

    let resp = app.request("GET", "/api/admin/metrics", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["admission"]["admitted"], 1);

    let resp = app.request("GET", "/api/admin/lease-pool", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["in_use"], 0);

    let resp = app.request("GET", "/api/admin/consistency", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["consistent"], true);

    let resp = app.request("POST", "/api/admin/reconcile", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["drift_detected"], false);
}
