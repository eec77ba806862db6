//! End to end: directory login followed by a group authorization check.

mod common;

use axum::http::StatusCode;
use common::TestApp;
use gateway_service::models::Team;
use serde_json::json;

fn app_with_acme_team(design_enabled: bool) -> TestApp {
    let app = TestApp::new();
    app.directory
        .add_user("alice", "CN=Alice A,OU=users,DC=example,DC=com", "s3cret");
    app.teams.add_team(
        "alice",
        "acme",
        "myapp",
        Team {
            name: "keywhiz-admin".to_string(),
            description: None,
            design_enabled,
            transition_enabled: true,
            operations_enabled: false,
        },
    );
    app
}

#[tokio::test]
async fn test_login_then_authorized_access() {
    let app = app_with_acme_team(true);

    let (status, body) = app.login_as("alice", "s3cret", Some("prod")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresInSec"], 3600);
    let token = body["accessToken"].as_str().unwrap().to_string();

    let (status, body) = app.get("/user", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["displayName"], "Alice A");

    let (status, body) = app.get("/apps/acme_myapp_prod/access", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "authorized": true,
            "group": "/prod/acme/myapp/prod",
            "user": "alice"
        })
    );
}

#[tokio::test]
async fn test_login_then_denied_without_design_rights() {
    let app = app_with_acme_team(false);
    let token = app.token_for("alice", "s3cret", Some("prod")).await;

    let (status, body) = app.get("/apps/acme_myapp_prod/access", &token).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["message"],
        "Alice A is not authorized to manage secrets of /prod/acme/myapp/prod"
    );
    assert_eq!(body["path"], "/apps/acme_myapp_prod/access");
    assert!(body["timestamp"].is_string());
}
