//! Test helpers for gateway-service integration tests.
//!
//! Builds the full router on in-memory collaborators: a mock directory, a
//! static team table and a mock secrets store. Tenant endpoints and the
//! proxy upstream are pointed at wiremock or local servers by the tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use gateway_service::{
    build_router,
    config::GatewayConfig,
    models::Team,
    services::{
        AuthzDispatcher, AuthzSettings, BackendClientCache, ConfiguredBackendFactory,
        DirectoryAuthenticator, MockDirectory, MockSecretStore, ProxyForwarder,
        StaticTeamRepository, TokenService,
    },
    AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const SIGNING_KEY: &str =
    "integration-test-signing-key-that-is-comfortably-longer-than-sixty-four-bytes-for-hs512";

pub const ALICE_DN: &str = "CN=Alice Anders,OU=Users,DC=example,DC=com";
pub const ALICE_PASSWORD: &str = "wonderland";
pub const BOB_DN: &str = "CN=Bob Builder,OU=Users,DC=example,DC=com";
pub const BOB_PASSWORD: &str = "canwefixit";

/// Configuration with every remote endpoint set to a placeholder. Tests
/// override sections through `overrides`, merged over the base document.
pub fn test_config(overrides: Value) -> GatewayConfig {
    let mut base = json!({
        "environment": "dev",
        "service_name": "gateway-service-test",
        "log_level": "error",
        "default_domain": "prod",
        "jwt": {
            "signing_key": SIGNING_KEY,
            "issuer": "gateway-test",
            "expiry_seconds": 3600
        },
        "ldap": {
            "url": "ldap://127.0.0.1:1",
            "base_dn": "OU=Users,DC=example,DC=com",
            "bind_dn": "CN=svc,DC=example,DC=com",
            "bind_password": "svc-password"
        },
        "authz": {},
        "secrets_store": {
            "url": "https://127.0.0.1:1"
        },
        "proxy": {
            "target": "http://127.0.0.1:1",
            "path_prefix": "/proxy"
        }
    });
    merge(&mut base, overrides);

    let config: GatewayConfig =
        serde_json::from_value(base).expect("Failed to deserialize test config");
    config.validate().expect("Test config is invalid");
    config
}

fn merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                merge(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overrides) => *base = overrides,
    }
}

pub fn admin_team(name: &str) -> Team {
    Team {
        name: name.to_string(),
        description: None,
        design_enabled: true,
        transition_enabled: true,
        operations_enabled: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub directory: Arc<MockDirectory>,
    pub teams: Arc<StaticTeamRepository>,
    pub secrets: Arc<MockSecretStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(json!({})))
    }

    /// alice administers `oneops/myapp`; bob only has design rights there.
    pub fn with_config(config: GatewayConfig) -> Self {
        let directory = Arc::new(MockDirectory::new());
        directory.add_user("alice", ALICE_DN, ALICE_PASSWORD);
        directory.add_user("bob", BOB_DN, BOB_PASSWORD);

        let teams = Arc::new(
            StaticTeamRepository::new()
                .with_team("alice", "oneops", "myapp", admin_team("keywhiz-admin"))
                .with_team(
                    "bob",
                    "oneops",
                    "myapp",
                    Team {
                        transition_enabled: false,
                        ..admin_team("keywhiz-admin")
                    },
                ),
        );
        let secrets = Arc::new(MockSecretStore::new());

        let tokens = TokenService::new(&config.jwt).expect("Failed to create token service");
        let authenticator = DirectoryAuthenticator::new(directory.clone(), &config.ldap)
            .expect("Failed to create authenticator");
        let factory = Arc::new(ConfiguredBackendFactory::new(
            config.authz.clone(),
            teams.clone(),
        ));
        let authz = AuthzDispatcher::new(
            AuthzSettings::from(&config.authz),
            factory,
            Arc::new(BackendClientCache::new(config.authz.client_cache_capacity)),
        );
        let proxy = ProxyForwarder::new(&config.proxy, &config.jwt.header)
            .expect("Failed to create proxy forwarder");

        let state = AppState {
            config: Arc::new(config),
            tokens,
            directory: Arc::new(authenticator),
            authz: Arc::new(authz),
            secrets: secrets.clone(),
            proxy: Arc::new(proxy),
        };
        let router = build_router(state.clone()).expect("Failed to build router");

        Self {
            router,
            state,
            directory,
            teams,
            secrets,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn login_as(&self, username: &str, password: &str, domain: Option<&str>) -> (StatusCode, Value) {
        let mut body = json!({ "username": username, "password": password });
        if let Some(domain) = domain {
            body["domain"] = json!(domain);
        }
        self.send(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Logs in and returns the access token.
    pub async fn token_for(&self, username: &str, password: &str, domain: Option<&str>) -> String {
        let (status, body) = self.login_as(username, password, domain).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["accessToken"]
            .as_str()
            .expect("accessToken missing")
            .to_string()
    }

    pub async fn alice_token(&self) -> String {
        self.token_for("alice", ALICE_PASSWORD, None).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .uri(uri)
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}
