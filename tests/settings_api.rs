mod common;

use std::sync::Arc;

use cookie::Cookie;
use serde_json::{Value, json};

use common::{FakeCatalog, FakePuffer, TestApp};

fn with_csrf(request: axum_test::TestRequest) -> axum_test::TestRequest {
    request
        .add_cookie(Cookie::new("csrf_token", "tok"))
        .add_header("x-csrf-token", "tok")
}

#[tokio::test]
async fn secrets_round_trip_with_csrf() {
    let remote = FakePuffer::with_server("srv-1", "Secrets");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;

    let status = app.server.get("/api/settings/secret/modrinth/status").await;
    status.assert_status_ok();
    assert_eq!(status.json::<Value>()["configured"], false);

    // Mutations without the double-submit pair are refused.
    let rejected = app
        .server
        .post("/api/settings/secret/modrinth")
        .json(&json!({"value": "mrp_supersecret"}))
        .await;
    rejected.assert_status(axum::http::StatusCode::FORBIDDEN);

    let stored = with_csrf(app.server.post("/api/settings/secret/modrinth"))
        .json(&json!({"value": "mrp_supersecret"}))
        .await;
    stored.assert_status_ok();

    let status = app.server.get("/api/settings/secret/modrinth/status").await;
    let body: Value = status.json();
    assert_eq!(body["configured"], true);
    assert_eq!(body["last4"], "…cret");

    let removed = with_csrf(app.server.delete("/api/settings/secret/modrinth")).await;
    removed.assert_status_ok();
    let status = app.server.get("/api/settings/secret/modrinth/status").await;
    assert_eq!(status.json::<Value>()["configured"], false);
}

#[tokio::test]
async fn unknown_secret_types_are_rejected() {
    let remote = FakePuffer::with_server("srv-1", "Secrets");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;

    let response = with_csrf(app.server.post("/api/settings/secret/launchpad"))
        .json(&json!({"value": "nope"}))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn secret_writes_are_rate_limited() {
    let remote = FakePuffer::with_server("srv-1", "Secrets");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;

    let mut limited = 0;
    for i in 0..10 {
        let response = with_csrf(app.server.post("/api/settings/secret/modrinth"))
            .json(&json!({"value": format!("token-{i}")}))
            .await;
        if response.status_code() == axum::http::StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
            assert_eq!(response.json::<Value>()["code"], "too_many_requests");
        }
    }
    assert!(limited > 0, "a burst of 10 writes must trip the 5/s bucket");
}

#[tokio::test]
async fn pufferpanel_test_reports_unreachable_remotes() {
    let remote = FakePuffer::with_server("srv-1", "Test");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;

    let response = app
        .server
        .post("/api/pufferpanel/test")
        .json(&json!({
            "baseUrl": "http://127.0.0.1:1",
            "clientId": "id",
            "clientSecret": "secret",
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);
    assert_eq!(response.json::<Value>()["code"], "bad_gateway");
}

#[tokio::test]
async fn bearer_auth_guards_the_api_when_configured() {
    let remote = FakePuffer::with_server("srv-1", "Locked");
    let app = TestApp::spawn_with(
        Arc::new(remote),
        Arc::new(FakeCatalog::default()),
        |settings| settings.env.admin_token = Some("hunter2".to_string().into()),
    )
    .await;

    let anonymous = app.server.get("/api/instances").await;
    anonymous.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.json::<Value>()["code"], "unauthorized");

    let wrong = app
        .server
        .get("/api/instances")
        .add_header("authorization", "Bearer wrong")
        .await;
    wrong.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let authed = app
        .server
        .get("/api/instances")
        .add_header("authorization", "Bearer hunter2")
        .await;
    authed.assert_status_ok();
}

#[tokio::test]
async fn error_bodies_carry_a_request_id() {
    let remote = FakePuffer::with_server("srv-1", "Traced");
    let app = TestApp::spawn(Arc::new(remote), Arc::new(FakeCatalog::default())).await;

    let response = app.server.get("/api/instances/999").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "not_found");
    let request_id = body["requestId"].as_str().unwrap();
    assert!(!request_id.is_empty());
    assert_eq!(
        response.headers().get("x-request-id").unwrap().to_str().unwrap(),
        request_id
    );
}
