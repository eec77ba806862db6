use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::{
    dtos::{LoginRequest, UserResponse},
    middleware::AuthUser,
    models::Credentials,
    services::{GatewayError, IssuedToken},
    utils::ValidatedJson,
    AppState,
};

/// Login with directory username and password
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = IssuedToken),
        (status = 401, description = "Invalid username or password"),
        (status = 422, description = "Validation error"),
        (status = 503, description = "Directory unavailable")
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<(StatusCode, Json<IssuedToken>), AppError> {
    let domain = req.domain.unwrap_or(state.config.default_domain);
    let credentials = Credentials::new(req.username, req.password);

    let principal = state.directory.authenticate(credentials, domain).await?;
    let token = state
        .tokens
        .issue(&principal)
        .map_err(GatewayError::from)?;

    tracing::info!(user = %principal.username, domain = %domain, "Issued access token");
    Ok((StatusCode::OK, Json(token)))
}

/// Current user
#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "Authenticated principal", body = UserResponse),
        (status = 401, description = "Missing, invalid or expired token")
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn current_user(AuthUser(principal): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(&principal))
}
