pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request, Uri},
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    error_envelope_middleware, metrics_middleware, request_id_middleware, REQUEST_ID_HEADER,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Environment, GatewayConfig};
use crate::services::{
    AuthzDispatcher, DirectoryAuthenticator, ProxyForwarder, SecretStore, TokenService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::current_user,
        handlers::apps::check_access,
        handlers::apps::list_secrets,
        handlers::apps::get_secret,
        handlers::apps::create_secret,
        handlers::apps::delete_secret,
        handlers::apps::list_clients,
        handlers::apps::create_client,
        handlers::apps::delete_client,
    ),
    components(
        schemas(
            dtos::LoginRequest,
            dtos::UserResponse,
            dtos::AccessResponse,
            dtos::CreateSecretRequest,
            dtos::SecretResponse,
            dtos::CreateClientRequest,
            dtos::ClientResponse,
            services::IssuedToken,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Directory login and gateway tokens"),
        (name = "Applications", description = "Secrets and clients of application groups"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub tokens: TokenService,
    pub directory: Arc<DirectoryAuthenticator>,
    pub authz: Arc<AuthzDispatcher>,
    pub secrets: Arc<dyn SecretStore>,
    pub proxy: Arc<ProxyForwarder>,
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let proxy_prefix = state.config.proxy.path_prefix.trim_end_matches('/').to_string();

    let protected = Router::new()
        .route("/user", get(handlers::current_user))
        .route("/apps/:app_name/access", get(handlers::check_access))
        .route("/apps/:app_name/secrets", get(handlers::list_secrets))
        .route(
            "/apps/:app_name/secrets/:secret",
            get(handlers::get_secret)
                .post(handlers::create_secret)
                .delete(handlers::delete_secret),
        )
        .route("/apps/:app_name/clients", get(handlers::list_clients))
        .route(
            "/apps/:app_name/clients/:client",
            post(handlers::create_client).delete(handlers::delete_client),
        )
        .route(&proxy_prefix, any(handlers::forward))
        .route(&format!("{}/*path", proxy_prefix), any(handlers::forward))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/login", post(handlers::login));

    if state.config.environment == Environment::Dev {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let token_header = HeaderName::from_bytes(state.config.jwt.header.to_ascii_lowercase().as_bytes())
        .map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "invalid token header '{}': {}",
                state.config.jwt.header,
                e
            ))
        })?;

    let origins: Vec<HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let app = app
        .merge(protected)
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(from_fn(error_envelope_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    token_header,
                    HeaderName::from_static(REQUEST_ID_HEADER),
                ]),
        );

    Ok(app)
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route for {}", uri.path()))
}

async fn method_not_allowed(method: Method, uri: Uri) -> AppError {
    AppError::MethodNotAllowed(format!("{} is not supported on {}", method, uri.path()))
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let search_cache = state.directory.search_cache().stats();
    let backend_clients = state.authz.clients().stats();

    Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "caches": {
            "directory_search": search_cache,
            "authz_backends": backend_clients,
        }
    }))
}
