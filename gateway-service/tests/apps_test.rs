//! Access checks and secret/client management for locally owned groups.

mod common;

use axum::http::StatusCode;
use common::{TestApp, BOB_PASSWORD};
use serde_json::json;

const GROUP: &str = "oneops_myapp_prod";

#[tokio::test]
async fn test_admin_team_member_has_access() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, body) = app.get(&format!("/apps/{}/access", GROUP), &token).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "authorized": true,
            "group": "/prod/oneops/myapp/prod",
            "user": "alice"
        })
    );
}

#[tokio::test]
async fn test_team_without_transition_rights_is_forbidden() {
    let app = TestApp::new();
    let token = app.token_for("bob", BOB_PASSWORD, None).await;

    let (status, body) = app.get(&format!("/apps/{}/access", GROUP), &token).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);
    assert_eq!(body["error"], "Forbidden");
    assert_eq!(
        body["message"],
        "Bob Builder is not authorized to manage secrets of /prod/oneops/myapp/prod"
    );
    assert_eq!(body["path"], "/apps/oneops_myapp_prod/access");
}

#[tokio::test]
async fn test_domain_prefix_overrides_login_domain() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, body) = app
        .get("/apps/ms-prod_oneops_myapp_prod/access", &token)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group"], "/ms-prod/oneops/myapp/prod");
}

#[tokio::test]
async fn test_malformed_group_names_are_bad_requests() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    for name in ["myapp", "oneops_myapp", "oneops__prod", "bogus_oneops_myapp_prod"] {
        let (status, body) = app.get(&format!("/apps/{}/access", name), &token).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "group {:?}", name);
        assert_eq!(body["status"], 400);
    }
}

#[tokio::test]
async fn test_unknown_assembly_is_forbidden() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, _) = app.get("/apps/oneops_otherapp_prod/access", &token).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_assembly_admin_team_has_access() {
    let app = TestApp::new();
    app.teams.add_team(
        "bob",
        "oneops",
        "billing",
        common::admin_team("keywhiz-admin-billing"),
    );
    let token = app.token_for("bob", BOB_PASSWORD, None).await;

    let (status, _) = app.get("/apps/oneops_billing_dev/access", &token).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_secret_lifecycle() {
    let app = TestApp::new();
    let token = app.alice_token().await;
    let secrets = format!("/apps/{}/secrets", GROUP);

    let (status, body) = app.get(&secrets, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = app
        .post_json(
            &format!("{}/db-password", secrets),
            &token,
            json!({ "content": "c2VjcmV0", "description": "primary database" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "db-password");
    assert_eq!(body["uniqueName"], "prod_oneops_myapp_prod@db-password");
    assert_eq!(body["description"], "primary database");
    assert_eq!(body["createdBy"], "alice");
    assert!(app.secrets.has_group("prod_oneops_myapp_prod"));

    let (status, body) = app.get(&secrets, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["db-password"]));

    let (status, body) = app.get(&format!("{}/db-password", secrets), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uniqueName"], "prod_oneops_myapp_prod@db-password");

    let (status, _) = app.delete(&format!("{}/db-password", secrets), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get(&format!("{}/db-password", secrets), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_secrets_are_scoped_by_domain() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, _) = app
        .post_json(
            "/apps/oneops_myapp_prod/secrets/api-key",
            &token,
            json!({ "content": "a2V5" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .get("/apps/mgmt_oneops_myapp_prod/secrets", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    assert_eq!(
        app.secrets.secret_names(),
        vec!["prod_oneops_myapp_prod@api-key".to_string()]
    );
}

#[tokio::test]
async fn test_duplicate_secret_is_conflict() {
    let app = TestApp::new();
    let token = app.alice_token().await;
    let uri = format!("/apps/{}/secrets/tls-key", GROUP);

    let (status, _) = app.post_json(&uri, &token, json!({ "content": "a2V5" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.post_json(&uri, &token, json!({ "content": "a2V5" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);
}

#[tokio::test]
async fn test_secret_content_must_be_base64() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, body) = app
        .post_json(
            &format!("/apps/{}/secrets/db-password", GROUP),
            &token,
            json!({ "content": "not base64!" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Secret content must be base64 encoded");
    assert!(app.secrets.secret_names().is_empty());
}

#[tokio::test]
async fn test_secret_name_with_separator_is_rejected() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    let (status, _) = app
        .post_json(
            &format!("/apps/{}/secrets/a@b", GROUP),
            &token,
            json!({ "content": "c2VjcmV0" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unauthorized_user_cannot_create_secret() {
    let app = TestApp::new();
    let token = app.token_for("bob", BOB_PASSWORD, None).await;

    let (status, _) = app
        .post_json(
            &format!("/apps/{}/secrets/db-password", GROUP),
            &token,
            json!({ "content": "c2VjcmV0" }),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.secrets.secret_names().is_empty());
    assert!(!app.secrets.has_group("prod_oneops_myapp_prod"));
}

#[tokio::test]
async fn test_client_lifecycle() {
    let app = TestApp::new();
    let token = app.alice_token().await;
    let clients = format!("/apps/{}/clients", GROUP);

    let (status, body) = app
        .post_json(
            &format!("{}/myapp-web", clients),
            &token,
            json!({ "description": "web tier" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "myapp-web");
    assert_eq!(body["uniqueName"], "prod_oneops_myapp_prod@myapp-web");

    let (status, body) = app.get(&clients, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["name"], "myapp-web");
    assert_eq!(body[0]["description"], "web tier");

    let (status, _) = app.delete(&format!("{}/myapp-web", clients), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get(&clients, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_backend_client_is_reused_across_requests() {
    let app = TestApp::new();
    let token = app.alice_token().await;

    for _ in 0..3 {
        let (status, _) = app.get(&format!("/apps/{}/access", GROUP), &token).await;
        assert_eq!(status, StatusCode::OK);
    }

    let stats = app.state.authz.clients().stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.insertions, 1);
    assert_eq!(stats.hits, 2);
}
