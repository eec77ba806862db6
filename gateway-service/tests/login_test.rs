//! Login and token handling through the full router.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use common::{test_config, TestApp, ALICE_PASSWORD};
use gateway_service::{
    config::JwtConfig,
    models::{AuthDomain, Principal},
    services::{DirectoryError, ManualClock, TokenService},
};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_login_issues_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.login_as("alice", ALICE_PASSWORD, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresInSec"], 3600);
    assert!(!body["accessToken"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_current_user_reflects_token() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, body) = app.get("/user", &token).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["displayName"], "Alice Anders");
    assert_eq!(body["domain"], "prod");
    assert_eq!(body["roles"], json!(["ROLE_USER"]));
}

#[tokio::test]
async fn test_login_into_named_domain() {
    let app = TestApp::new();
    let token = app.token_for("alice", ALICE_PASSWORD, Some("ms-prod")).await;

    let (status, body) = app.get("/user", &token).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domain"], "ms-prod");
}

#[tokio::test]
async fn test_login_with_unknown_domain_is_rejected() {
    let app = TestApp::new();

    let (status, _) = app.login_as("alice", ALICE_PASSWORD, Some("staging")).await;

    assert!(status.is_client_error());
    assert_eq!(app.directory.bind_calls(), 0);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new();

    let (status, body) = app.login_as("alice", "not-the-password", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
    assert_eq!(body["message"], "Invalid username or password");
    assert_eq!(body["path"], "/login");
}

#[tokio::test]
async fn test_unknown_user_looks_like_wrong_password() {
    let app = TestApp::new();

    let (status, body) = app.login_as("mallory", "whatever", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid username or password");
}

#[tokio::test]
async fn test_malformed_username_never_reaches_directory() {
    let app = TestApp::new();

    for username in ["alice)(cn=*", "*", "alice bob", "al/ice"] {
        let (status, _) = app.login_as(username, "x", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "username {:?}", username);
    }

    assert_eq!(app.directory.search_calls(), 0);
    assert_eq!(app.directory.bind_calls(), 0);
}

#[tokio::test]
async fn test_empty_username_fails_validation() {
    let app = TestApp::new();

    let (status, body) = app.login_as("", "x", None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], 422);
}

#[tokio::test]
async fn test_directory_outage_is_service_unavailable() {
    let app = TestApp::new();
    app.directory
        .fail_with(Some(DirectoryError::Unavailable("connection refused".into())));

    let (status, body) = app.login_as("alice", ALICE_PASSWORD, None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], 503);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = TestApp::new();

    let (status, body) = app
        .send(Request::builder().uri("/user").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["path"], "/user");
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let app = TestApp::new();

    let (status, body) = app.get("/user", "not.a.token").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn test_token_without_scheme_is_unauthorized() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, _) = app
        .send(
            Request::builder()
                .uri("/user")
                .header("authorization", token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let app = TestApp::new();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap(),
    ));
    let issuer = TokenService::with_clock(&app.state.config.jwt, clock).unwrap();
    let token = issuer
        .issue(&Principal::new("alice", AuthDomain::Prod))
        .unwrap()
        .access_token;

    let (status, body) = app.get("/user", &token).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token expired, please log in again");
}

#[tokio::test]
async fn test_token_signed_with_other_key_is_unauthorized() {
    let app = TestApp::new();
    let foreign = TokenService::new(&JwtConfig {
        signing_key: SecretString::new("f".repeat(64)),
        ..app.state.config.jwt.clone()
    })
    .unwrap();
    let token = foreign
        .issue(&Principal::new("alice", AuthDomain::Prod))
        .unwrap()
        .access_token;

    let (status, body) = app.get("/user", &token).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn test_custom_token_header() {
    let app = TestApp::with_config(test_config(json!({
        "jwt": { "header": "X-Gateway-Token" }
    })));
    let token = app.alice_token().await;

    let (status, _) = app.get("/user", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            Request::builder()
                .uri("/user")
                .header("x-gateway-token", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn test_health_check_is_public() {
    let app = TestApp::new();

    let (status, body) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "gateway-service-test");
}

#[tokio::test]
async fn test_unknown_route_returns_error_body() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, body) = app.get("/no/such/route", &token).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["path"], "/no/such/route");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_unsupported_method_returns_error_body() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, body) = app
        .send(Request::builder().method("DELETE").uri("/login").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["status"], 405);
    assert_eq!(body["path"], "/login");

    let (status, body) = app.get("/apps/oneops_myapp_prod/clients/web", &token).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "Method Not Allowed");
    assert_eq!(body["path"], "/apps/oneops_myapp_prod/clients/web");
}
