//! Per-application-group endpoints. Every handler parses the group from the
//! path, authorizes the caller for it, and only then talks to the store.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use service_core::error::AppError;
use std::collections::BTreeMap;

use crate::{
    dtos::{
        AccessResponse, ClientResponse, CreateClientRequest, CreateSecretRequest, SecretResponse,
    },
    middleware::AuthUser,
    models::{AppGroup, AppSecret, Principal},
    services::{CreateClient, CreateSecret, GatewayError, SecretStoreError},
    utils::ValidatedJson,
    AppState,
};

async fn authorized_group(
    state: &AppState,
    principal: &Principal,
    app_name: &str,
) -> Result<AppGroup, AppError> {
    let group = AppGroup::parse(principal.domain, app_name)?;
    state.authz.ensure_authorized(&group, principal).await?;
    Ok(group)
}

fn group_description(group: &AppGroup) -> String {
    format!("Secrets of {}", group.canonical_path())
}

/// Check whether the caller may manage secrets of an application group
#[utoipa::path(
    get,
    path = "/apps/{app_name}/access",
    params(("app_name" = String, Path, description = "Application group, org_assembly_env")),
    responses(
        (status = 200, description = "Caller is authorized", body = AccessResponse),
        (status = 400, description = "Malformed group name"),
        (status = 403, description = "Caller is not authorized"),
        (status = 503, description = "Authorization backend unavailable")
    ),
    tag = "Applications",
    security(("bearer_auth" = []))
)]
pub async fn check_access(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(app_name): Path<String>,
) -> Result<Json<AccessResponse>, AppError> {
    let group = authorized_group(&state, &principal, &app_name).await?;
    Ok(Json(AccessResponse {
        authorized: true,
        group: group.canonical_path(),
        user: principal.username,
    }))
}

/// List secret names of an application group
#[utoipa::path(
    get,
    path = "/apps/{app_name}/secrets",
    params(("app_name" = String, Path, description = "Application group")),
    responses(
        (status = 200, description = "Short secret names", body = Vec<String>),
        (status = 403, description = "Caller is not authorized")
    ),
    tag = "Applications",
    security(("bearer_auth" = []))
)]
pub async fn list_secrets(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(app_name): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let group = authorized_group(&state, &principal, &app_name).await?;

    let secrets = match state.secrets.list_group_secrets(&group.qualified_name()).await {
        Ok(secrets) => secrets,
        Err(SecretStoreError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(GatewayError::from(e).into()),
    };

    let mut names: Vec<String> = secrets
        .iter()
        .filter_map(|detail| match AppSecret::from_unique_name(&detail.name) {
            Ok(secret) => Some(secret.short_name().to_string()),
            Err(_) => {
                tracing::warn!(name = %detail.name, "Skipping secret with foreign name");
                None
            }
        })
        .collect();
    names.sort();

    Ok(Json(names))
}

/// Secret metadata
#[utoipa::path(
    get,
    path = "/apps/{app_name}/secrets/{secret}",
    params(
        ("app_name" = String, Path, description = "Application group"),
        ("secret" = String, Path, description = "Short secret name")
    ),
    responses(
        (status = 200, description = "Secret metadata", body = SecretResponse),
        (status = 404, description = "No such secret")
    ),
    tag = "Applications",
    security(("bearer_auth" = []))
)]
pub async fn get_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path((app_name, secret)): Path<(String, String)>,
) -> Result<Json<SecretResponse>, AppError> {
    let group = authorized_group(&state, &principal, &app_name).await?;
    let secret = AppSecret::new(&secret, group)?;

    let detail = state
        .secrets
        .get_secret(&secret.unique_name())
        .await
        .map_err(GatewayError::from)?;

    Ok(Json(SecretResponse::new(
        secret.short_name().to_string(),
        detail,
    )))
}

/// Create a secret in an application group
#[utoipa::path(
    post,
    path = "/apps/{app_name}/secrets/{secret}",
    params(
        ("app_name" = String, Path, description = "Application group"),
        ("secret" = String, Path, description = "Short secret name")
    ),
    request_body = CreateSecretRequest,
    responses(
        (status = 201, description = "Secret created", body = SecretResponse),
        (status = 400, description = "Malformed name or content"),
        (status = 409, description = "Secret already exists")
    ),
    tag = "Applications",
    security(("bearer_auth" = []))
)]
pub async fn create_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path((app_name, secret)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<CreateSecretRequest>,
) -> Result<(StatusCode, Json<SecretResponse>), AppError> {
    let group = authorized_group(&state, &principal, &app_name).await?;
    let secret = AppSecret::new(&secret, group)?;

    if STANDARD.decode(req.content.as_bytes()).is_err() {
        return Err(
            GatewayError::InvalidFormat("Secret content must be base64 encoded".to_string()).into(),
        );
    }

    let group_name = secret.group().qualified_name();
    state
        .secrets
        .ensure_group(&group_name, &group_description(secret.group()))
        .await
        .map_err(GatewayError::from)?;

    let mut metadata = BTreeMap::new();
    metadata.insert("owner".to_string(), principal.username.clone());

    let request = CreateSecret {
        name: secret.unique_name(),
        content: req.content,
        description: req.description,
        groups: vec![group_name],
        metadata,
    };
    state
        .secrets
        .create_secret(&request)
        .await
        .map_err(GatewayError::from)?;

    let detail = state
        .secrets
        .get_secret(&request.name)
        .await
        .map_err(GatewayError::from)?;

    tracing::info!(
        user = %principal.username,
        secret = %request.name,
        "Secret created"
    );
    Ok((
        StatusCode::CREATED,
        Json(SecretResponse::new(secret.short_name().to_string(), detail)),
    ))
}

/// Delete a secret
#[utoipa::path(
    delete,
    path = "/apps/{app_name}/secrets/{secret}",
    params(
        ("app_name" = String, Path, description = "Application group"),
        ("secret" = String, Path, description = "Short secret name")
    ),
    responses(
        (status = 204, description = "Secret deleted"),
        (status = 404, description = "No such secret")
    ),
    tag = "Applications",
    security(("bearer_auth" = []))
)]
pub async fn delete_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path((app_name, secret)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let group = authorized_group(&state, &principal, &app_name).await?;
    let secret = AppSecret::new(&secret, group)?;

    state
        .secrets
        .delete_secret(&secret.unique_name())
        .await
        .map_err(GatewayError::from)?;

    tracing::info!(user = %principal.username, secret = %secret.unique_name(), "Secret deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// List clients of an application group
#[utoipa::path(
    get,
    path = "/apps/{app_name}/clients",
    params(("app_name" = String, Path, description = "Application group")),
    responses(
        (status = 200, description = "Clients of the group", body = Vec<ClientResponse>),
        (status = 403, description = "Caller is not authorized")
    ),
    tag = "Applications",
    security(("bearer_auth" = []))
)]
pub async fn list_clients(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(app_name): Path<String>,
) -> Result<Json<Vec<ClientResponse>>, AppError> {
    let group = authorized_group(&state, &principal, &app_name).await?;

    let clients = match state.secrets.list_group_clients(&group.qualified_name()).await {
        Ok(clients) => clients,
        Err(SecretStoreError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(GatewayError::from(e).into()),
    };

    Ok(Json(
        clients
            .into_iter()
            .map(|detail| {
                let short = detail
                    .name
                    .rsplit_once('@')
                    .map(|(_, short)| short.to_string())
                    .unwrap_or_else(|| detail.name.clone());
                ClientResponse::new(short, detail)
            })
            .collect(),
    ))
}

/// Create a client with access to an application group
#[utoipa::path(
    post,
    path = "/apps/{app_name}/clients/{client}",
    params(
        ("app_name" = String, Path, description = "Application group"),
        ("client" = String, Path, description = "Short client name")
    ),
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client created", body = ClientResponse),
        (status = 409, description = "Client already exists")
    ),
    tag = "Applications",
    security(("bearer_auth" = []))
)]
pub async fn create_client(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path((app_name, client)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<CreateClientRequest>,
) -> Result<(StatusCode, Json<ClientResponse>), AppError> {
    let group = authorized_group(&state, &principal, &app_name).await?;
    // Clients share the secret naming scheme so they are unique per group.
    let client = AppSecret::new(&client, group)?;

    let group_name = client.group().qualified_name();
    state
        .secrets
        .ensure_group(&group_name, &group_description(client.group()))
        .await
        .map_err(GatewayError::from)?;

    let request = CreateClient {
        name: client.unique_name(),
        description: req.description,
        groups: vec![group_name],
    };
    state
        .secrets
        .create_client(&request)
        .await
        .map_err(GatewayError::from)?;

    tracing::info!(user = %principal.username, client = %request.name, "Client created");
    Ok((
        StatusCode::CREATED,
        Json(ClientResponse {
            name: client.short_name().to_string(),
            unique_name: request.name,
            description: request.description,
        }),
    ))
}

/// Delete a client
#[utoipa::path(
    delete,
    path = "/apps/{app_name}/clients/{client}",
    params(
        ("app_name" = String, Path, description = "Application group"),
        ("client" = String, Path, description = "Short client name")
    ),
    responses(
        (status = 204, description = "Client deleted"),
        (status = 404, description = "No such client")
    ),
    tag = "Applications",
    security(("bearer_auth" = []))
)]
pub async fn delete_client(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path((app_name, client)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let group = authorized_group(&state, &principal, &app_name).await?;
    let client = AppSecret::new(&client, group)?;

    state
        .secrets
        .delete_client(&client.unique_name())
        .await
        .map_err(GatewayError::from)?;

    tracing::info!(user = %principal.username, client = %client.unique_name(), "Client deleted");
    Ok(StatusCode::NO_CONTENT)
}
